//! Tool schema generation.
//!
//! [`describe`] projects a [`CapabilityDescriptor`] into a format-neutral
//! [`ToolDescription`]; [`render`] spells that description in one of the
//! provider wire formats. Neither touches the capability itself.

use std::collections::HashMap;

use agent_primitives::{
    CapabilityDescriptor, ParamKind, ParameterSpec, SchemaFormat, ToolDescription,
};
use serde_json::{Map, Value, json};

pub use agent_primitives::SchemaError;

const PARAM_MARKER: &str = ":param ";

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Builds the tool description for a capability.
#[must_use]
pub fn describe(descriptor: &CapabilityDescriptor) -> ToolDescription {
    let documentation = descriptor.documentation();
    let param_docs = param_descriptions(documentation);

    let parameters = descriptor
        .params()
        .iter()
        .map(|param| ParameterSpec {
            name: param.name().to_owned(),
            kind: ParamKind::from_declared(param.declared_type()),
            description: param_docs
                .get(param.name())
                .cloned()
                .unwrap_or_default(),
            required: !param.has_default(),
        })
        .collect();

    ToolDescription {
        name: descriptor.name().to_owned(),
        description: first_paragraph(documentation),
        parameters,
    }
}

/// Renders a tool description in the supplied wire format.
#[must_use]
pub fn render(description: &ToolDescription, format: SchemaFormat) -> Value {
    let (object_type, kind_token): (&str, fn(ParamKind) -> &'static str) = match format {
        SchemaFormat::Gemini => ("OBJECT", ParamKind::upper),
        SchemaFormat::OpenAi => ("object", ParamKind::lower),
        SchemaFormat::Anthropic => ("object", ParamKind::upper),
    };

    let properties: Map<String, Value> = description
        .parameters
        .iter()
        .map(|param| {
            (
                param.name.clone(),
                json!({
                    "type": kind_token(param.kind),
                    "description": param.description,
                }),
            )
        })
        .collect();

    let body = json!({
        "type": object_type,
        "properties": properties,
        "required": description.required(),
    });

    let body_field = match format {
        SchemaFormat::Gemini | SchemaFormat::OpenAi => "parameters",
        SchemaFormat::Anthropic => "input_schema",
    };

    let mut schema = Map::new();
    schema.insert("name".into(), Value::from(description.name.clone()));
    schema.insert(
        "description".into(),
        Value::from(description.description.clone()),
    );
    schema.insert(body_field.into(), body);
    Value::Object(schema)
}

/// Describes and renders a capability in the format named by `format`.
///
/// # Errors
///
/// Returns [`SchemaError::UnsupportedFormat`] when `format` is not `gemini`,
/// `openai`, or `anthropic`.
pub fn create_schema(descriptor: &CapabilityDescriptor, format: &str) -> SchemaResult<Value> {
    Ok(render(&describe(descriptor), parse_format(format)?))
}

/// Parses a schema format token such as `gemini`.
///
/// # Errors
///
/// Returns [`SchemaError::UnsupportedFormat`] for any other token.
pub fn parse_format(token: &str) -> SchemaResult<SchemaFormat> {
    token.parse()
}

/// Text up to the first blank line, with surrounding whitespace removed.
fn first_paragraph(documentation: &str) -> String {
    documentation
        .lines()
        .map(str::trim)
        .skip_while(|line| line.is_empty())
        .take_while(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collects `:param <name>: <text>` lines; a later line for the same name
/// wins.
fn param_descriptions(documentation: &str) -> HashMap<&str, String> {
    documentation
        .lines()
        .filter_map(|line| line.trim().strip_prefix(PARAM_MARKER))
        .filter_map(|rest| {
            let (name, text) = rest.split_once(':')?;
            Some((name.trim(), text.trim().to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use agent_primitives::{DeclaredType, ParamDecl};

    const GET_USER_DOC: &str = "
        Looks up a user by email, phone, or username.

        :param key: The attribute to search for a user by (email, phone, or username).
        :param value: The value to match for the specified attribute.
        :return:
    ";

    fn get_user() -> CapabilityDescriptor {
        CapabilityDescriptor::builder("get_user")
            .documentation(GET_USER_DOC)
            .with_receiver()
            .param(ParamDecl::new("self", DeclaredType::Unspecified))
            .param(ParamDecl::new("key", DeclaredType::Str))
            .param(ParamDecl::new("value", DeclaredType::Str))
            .build()
            .unwrap()
    }

    fn add_event() -> CapabilityDescriptor {
        CapabilityDescriptor::builder("add_calendar_event")
            .documentation("Add an event to the calendar.\nShares it.\n\n:param event_name: Title of the event")
            .param(ParamDecl::new("event_name", DeclaredType::Str))
            .param(ParamDecl::new("duration", DeclaredType::Float))
            .param(ParamDecl::new("notify", DeclaredType::Bool).with_default(false))
            .param(ParamDecl::new("event_start_time", DeclaredType::Str).with_default("00:00"))
            .build()
            .unwrap()
    }

    #[test]
    fn gemini_schema_matches_expected_shape() {
        let schema = create_schema(&get_user(), "gemini").unwrap();
        let expected = json!({
            "name": "get_user",
            "description": "Looks up a user by email, phone, or username.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "key": {
                        "type": "STRING",
                        "description": "The attribute to search for a user by (email, phone, or username)."
                    },
                    "value": {
                        "type": "STRING",
                        "description": "The value to match for the specified attribute."
                    }
                },
                "required": ["key", "value"]
            }
        });
        assert_eq!(schema, expected);
    }

    #[test]
    fn openai_schema_uses_lowercase_types() {
        let schema = create_schema(&get_user(), "openai").unwrap();
        assert_eq!(schema["parameters"]["type"], "object");
        assert_eq!(schema["parameters"]["properties"]["key"]["type"], "string");
    }

    #[test]
    fn anthropic_schema_uses_input_schema() {
        let schema = create_schema(&get_user(), "anthropic").unwrap();
        assert!(schema.get("parameters").is_none());
        assert_eq!(schema["input_schema"]["type"], "object");
        assert_eq!(schema["input_schema"]["properties"]["value"]["type"], "STRING");
        assert_eq!(schema["input_schema"]["required"], json!(["key", "value"]));
    }

    #[test]
    fn receiver_is_not_a_parameter() {
        let description = describe(&get_user());
        assert_eq!(description.parameters.len(), 2);
        assert_eq!(description.required(), ["key", "value"]);
    }

    #[test]
    fn required_tracks_defaults_and_kinds_track_types() {
        let description = describe(&add_event());
        assert_eq!(description.description, "Add an event to the calendar.\nShares it.");
        assert_eq!(description.required(), ["event_name", "duration"]);

        let kinds: Vec<_> = description.parameters.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            [
                ParamKind::String,
                ParamKind::Number,
                ParamKind::Boolean,
                ParamKind::String
            ]
        );
        assert_eq!(description.parameters[0].description, "Title of the event");
        assert_eq!(description.parameters[1].description, "");
    }

    #[test]
    fn formats_carry_the_same_content() {
        let description = describe(&add_event());
        let gemini = render(&description, SchemaFormat::Gemini);
        let anthropic = render(&description, SchemaFormat::Anthropic);
        let openai = render(&description, SchemaFormat::OpenAi);

        let bodies = [
            &gemini["parameters"],
            &anthropic["input_schema"],
            &openai["parameters"],
        ];
        for body in bodies {
            assert_eq!(body["required"], gemini["parameters"]["required"]);
            let properties = body["properties"].as_object().unwrap();
            assert_eq!(properties.len(), 4);
            for (name, property) in properties {
                assert_eq!(
                    property["description"],
                    gemini["parameters"]["properties"][name]["description"]
                );
                assert_eq!(
                    property["type"].as_str().unwrap().to_ascii_uppercase(),
                    gemini["parameters"]["properties"][name]["type"]
                );
            }
        }
        assert_eq!(gemini["description"], openai["description"]);
    }

    #[test]
    fn undocumented_capability_has_empty_description() {
        let descriptor = CapabilityDescriptor::builder("get_directory_name")
            .build()
            .unwrap();
        let description = describe(&descriptor);
        assert_eq!(description.description, "");
        assert!(description.parameters.is_empty());
    }

    #[test]
    fn unsupported_format_errors() {
        let err = create_schema(&get_user(), "cohere").expect_err("unknown format");
        assert_eq!(
            err,
            SchemaError::UnsupportedFormat {
                token: "cohere".into()
            }
        );
    }

    #[test]
    fn format_tokens_share_one_error() {
        let parsed = "cohere".parse::<SchemaFormat>().expect_err("unknown format");
        assert_eq!(parse_format("cohere").expect_err("unknown format"), parsed);
    }
}
