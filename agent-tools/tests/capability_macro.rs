use agent_tools::capability;
use agent_tools::schema::describe;
use agent_tools::{CapabilityDescriptor, DeclaredType};
use agent_primitives::ParamKind;

/// Move files into folders named after their type.
///
/// :param path: Directory whose files are organised
/// :param dry_run: Only report what would move
#[capability(contextual(path))]
fn organize_files_by_type(path: String, dry_run: Option<bool>, limit: usize) -> usize {
    let _ = (path, dry_run);
    limit
}

/// Read the todo list and return its tasks.
#[capability(name = "read_todo", yields_tasks)]
pub fn read_todo_tasks(path: &str) -> Vec<String> {
    vec![path.to_owned()]
}

/// Ask which directory to work in.
#[capability(provides_context = "path")]
fn get_directory_name() -> String {
    String::from("/tmp")
}

struct Directory;

impl Directory {
    /// Looks up a user by email, phone, or username.
    ///
    /// :param key: The attribute to search for a user by.
    /// :param value: The value to match.
    #[capability]
    fn get_user(&self, key: &str, value: &str) -> bool {
        key == value
    }
}

#[test]
fn derives_params_in_declaration_order() {
    let descriptor: CapabilityDescriptor = organize_files_by_type_capability().unwrap();
    assert_eq!(descriptor.name(), "organize_files_by_type");

    let params = descriptor.params();
    assert_eq!(params.len(), 3);
    assert_eq!(params[0].name(), "path");
    assert!(params[0].is_contextual());
    assert_eq!(params[1].declared_type(), DeclaredType::Bool);
    assert!(params[1].has_default());
    assert_eq!(params[2].declared_type(), DeclaredType::Int);
    assert!(!params[2].has_default());
    assert_eq!(organize_files_by_type(String::new(), None, 3), 3);
}

#[test]
fn doc_comment_feeds_descriptions() {
    let description = describe(&organize_files_by_type_capability().unwrap());
    assert_eq!(
        description.description,
        "Move files into folders named after their type."
    );
    assert_eq!(
        description.parameters[0].description,
        "Directory whose files are organised"
    );
    assert_eq!(description.parameters[1].kind, ParamKind::Boolean);
    assert_eq!(description.parameters[2].kind, ParamKind::Number);
    assert_eq!(description.required(), ["path", "limit"]);
}

#[test]
fn options_are_carried_over() {
    let todo = read_todo_tasks_capability().unwrap();
    assert_eq!(todo.name(), "read_todo");
    assert!(todo.yields_tasks());

    let directory = get_directory_name_capability().unwrap();
    assert_eq!(directory.provides_context(), Some("path"));
    assert!(directory.params().is_empty());
    assert_eq!(get_directory_name(), "/tmp");
    assert_eq!(read_todo_tasks("x"), ["x"]);
}

#[test]
fn methods_skip_the_receiver() {
    let descriptor = Directory::get_user_capability().unwrap();
    assert_eq!(descriptor.declared_params().len(), 3);

    let description = describe(&descriptor);
    assert_eq!(description.parameters.len(), 2);
    assert_eq!(description.required(), ["key", "value"]);
    assert!(Directory.get_user("a", "a"));
}
