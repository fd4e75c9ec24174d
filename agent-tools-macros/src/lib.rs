//! Procedural macros for capability declarations.
//!
//! `#[capability]` leaves the annotated function untouched and emits a
//! sibling `<name>_capability()` function returning the capability's
//! descriptor, built from the signature and doc comment.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, Expr, FnArg, GenericArgument, ImplItemFn, Lit, LitStr, Meta, Pat, PathArguments,
    Signature, Type, Visibility, parse_macro_input,
};

#[derive(Default)]
struct Options {
    name: Option<String>,
    provides_context: Option<String>,
    yields_tasks: bool,
    contextual: Vec<String>,
}

/// Declares a function as a capability.
///
/// Parameters become declared parameters in order; a `self` receiver is
/// skipped when describing the tool. Integer, float, and `bool` types map to
/// their declared types, `Vec<T>` and slices to lists, and `Option<T>`
/// parameters are optional. Doc comments become the documentation, so
/// `:param <name>: <text>` lines describe individual parameters.
///
/// Supported options: `name = "..."`, `provides_context = "key"`,
/// `yields_tasks`, and `contextual(param, ...)`.
#[proc_macro_attribute]
pub fn capability(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = Options::default();
    let option_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            let value: LitStr = meta.value()?.parse()?;
            options.name = Some(value.value());
            Ok(())
        } else if meta.path.is_ident("provides_context") {
            let value: LitStr = meta.value()?.parse()?;
            options.provides_context = Some(value.value());
            Ok(())
        } else if meta.path.is_ident("yields_tasks") {
            options.yields_tasks = true;
            Ok(())
        } else if meta.path.is_ident("contextual") {
            meta.parse_nested_meta(|inner| {
                let ident = inner
                    .path
                    .get_ident()
                    .ok_or_else(|| inner.error("expected a parameter name"))?;
                options.contextual.push(ident.to_string());
                Ok(())
            })
        } else {
            Err(meta.error("unsupported capability option"))
        }
    });
    parse_macro_input!(attr with option_parser);

    // `ImplItemFn` accepts both free functions and methods.
    let function = parse_macro_input!(item as ImplItemFn);
    match expand(&options, &function.attrs, &function.vis, &function.sig) {
        Ok(descriptor_fn) => quote! {
            #function
            #descriptor_fn
        }
        .into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(
    options: &Options,
    attrs: &[Attribute],
    vis: &Visibility,
    sig: &Signature,
) -> syn::Result<TokenStream2> {
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| sig.ident.to_string());
    let documentation = doc_text(attrs);
    let descriptor_ident = format_ident!("{}_capability", sig.ident);

    let mut receiver = false;
    let mut params = Vec::new();
    for input in &sig.inputs {
        match input {
            FnArg::Receiver(_) => {
                receiver = true;
                params.push(quote! {
                    ::agent_tools::ParamDecl::new("self", ::agent_tools::DeclaredType::Unspecified)
                });
            }
            FnArg::Typed(typed) => {
                let Pat::Ident(pat) = typed.pat.as_ref() else {
                    return Err(syn::Error::new_spanned(
                        &typed.pat,
                        "capability parameters must be plain identifiers",
                    ));
                };
                let param_name = pat.ident.to_string();
                let param_name = param_name.trim_start_matches("r#").to_owned();
                let (declared, optional) = classify(&typed.ty);
                let declared = format_ident!("{}", declared);

                let mut decl = quote! {
                    ::agent_tools::ParamDecl::new(#param_name, ::agent_tools::DeclaredType::#declared)
                };
                if optional {
                    decl = quote! { #decl.optional() };
                }
                if options.contextual.contains(&param_name) {
                    decl = quote! { #decl.contextual() };
                }
                params.push(decl);
            }
        }
    }

    for contextual in &options.contextual {
        let declared = sig.inputs.iter().any(|input| match input {
            FnArg::Typed(typed) => {
                matches!(typed.pat.as_ref(), Pat::Ident(pat) if pat.ident == contextual.as_str())
            }
            FnArg::Receiver(_) => false,
        });
        if !declared {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                format!("contextual parameter `{contextual}` is not declared"),
            ));
        }
    }

    let receiver = receiver.then(|| quote! { .with_receiver() });
    let provides_context = options
        .provides_context
        .as_ref()
        .map(|key| quote! { .provides_context(#key) });
    let yields_tasks = options.yields_tasks.then(|| quote! { .yields_tasks() });
    let doc = format!("Capability descriptor for [`{}`].", sig.ident);

    Ok(quote! {
        #[doc = #doc]
        #[allow(dead_code)]
        #vis fn #descriptor_ident() -> ::core::result::Result<
            ::agent_tools::CapabilityDescriptor,
            ::agent_tools::DescriptorError,
        > {
            ::agent_tools::CapabilityDescriptor::builder(#name)
                .documentation(#documentation)
                #(.param(#params))*
                #receiver
                #provides_context
                #yields_tasks
                .build()
        }
    })
}

/// Joins `///` lines, dropping the single space rustdoc leaves after `///`.
fn doc_text(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(pair) => match &pair.value {
                Expr::Lit(expr) => match &expr.lit {
                    Lit::Str(text) => Some(text.value()),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .map(|line| line.strip_prefix(' ').unwrap_or(&line).to_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Maps a Rust type to a `DeclaredType` variant name and whether it is
/// optional.
fn classify(ty: &Type) -> (&'static str, bool) {
    match ty {
        Type::Reference(reference) => classify(&reference.elem),
        Type::Slice(_) | Type::Array(_) => ("List", false),
        Type::Group(group) => classify(&group.elem),
        Type::Paren(paren) => classify(&paren.elem),
        Type::Path(path) => {
            let Some(last) = path.path.segments.last() else {
                return ("Unspecified", false);
            };
            match last.ident.to_string().as_str() {
                "Option" => {
                    let inner = first_type_argument(&last.arguments)
                        .map_or("Unspecified", |inner| classify(inner).0);
                    (inner, true)
                }
                "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => ("List", false),
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
                | "u64" | "u128" | "usize" => ("Int", false),
                "f32" | "f64" => ("Float", false),
                "bool" => ("Bool", false),
                "String" | "str" | "PathBuf" | "Path" | "Cow" => ("Str", false),
                _ => ("Unspecified", false),
            }
        }
        _ => ("Unspecified", false),
    }
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(generic) = arguments else {
        return None;
    };
    generic.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}
