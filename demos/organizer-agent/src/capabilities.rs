//! Filesystem capabilities exposed to the model.
//!
//! Every path argument is confined to the working directory the agent was
//! started with.

use std::collections::BTreeMap;
use std::fs;
use std::future::{Ready, ready};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_tools::capability;
use serde_json::{Value, json};
use taskpilot::tools::arguments::{Arguments, ArgumentsExt};
use taskpilot::tools::registry::{ArgumentAliases, CapabilityRegistry, ToolError, ToolResult};
use tracing::{debug, info};

const TODO_FILE: &str = "todo.txt";
const OTHER_CATEGORY: &str = "Others";

/// Folder name for a file, picked from its extension.
fn category(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => "PDFs",
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" => "Images",
        "doc" | "docx" | "txt" | "md" | "csv" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" => {
            "Documents"
        }
        "py" | "rs" | "c" | "cpp" | "h" | "java" | "js" | "ts" | "go" | "sh" => "Code_Files",
        "zip" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "7z" | "rar" => "Archives",
        _ => OTHER_CATEGORY,
    }
}

fn io_failure(action: &str, path: &Path, err: &io::Error) -> ToolError {
    ToolError::execution(format!("cannot {action} `{}`: {err}", path.display()))
}

/// Reminder text from a `Remind me to "..."` line.
fn reminder(line: &str) -> Option<&str> {
    let start = line.to_ascii_lowercase().find("remind me to")?;
    let rest = &line[start..];
    let open = rest.find('"')?;
    let quoted = &rest[open + 1..];
    let close = quoted.find('"')?;
    Some(quoted[..close].trim()).filter(|text| !text.is_empty())
}

/// Filesystem operations rooted at one directory.
#[derive(Debug, Clone)]
pub struct Organizer {
    root: PathBuf,
}

impl Organizer {
    /// Roots the organizer at `root`, which must be an existing directory.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while resolving `root`.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("`{}` is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// Resolves `path` and rejects anything outside the root.
    fn confine(&self, path: &str) -> ToolResult<PathBuf> {
        let candidate = self.root.join(path);
        let resolved = candidate
            .canonicalize()
            .map_err(|err| ToolError::invalid_arguments(format!("path `{path}`: {err}")))?;
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(ToolError::invalid_arguments(format!(
                "path `{path}` is outside `{}`",
                self.root.display()
            )))
        }
    }

    fn file_names(dir: &Path) -> ToolResult<Vec<String>> {
        let entries = fs::read_dir(dir).map_err(|err| io_failure("read", dir, &err))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_failure("read", dir, &err))?;
            let is_file = entry
                .file_type()
                .map_err(|err| io_failure("inspect", &entry.path(), &err))?
                .is_file();
            if is_file {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns the directory the user wants organized.
    #[capability(provides_context = "path")]
    pub fn get_directory_name(&self) -> String {
        self.root.display().to_string()
    }

    /// Lists the regular files directly inside a directory.
    ///
    /// :param path: Directory to scan
    #[capability(contextual(path))]
    pub fn scan_directory(&self, path: &str) -> ToolResult<Vec<String>> {
        let dir = self.confine(path)?;
        let files = Self::file_names(&dir)?;
        debug!(dir = %dir.display(), files = files.len(), "directory scanned");
        Ok(files)
    }

    /// Groups file names by category, using their extensions.
    ///
    /// :param files: File names to classify
    #[capability]
    pub fn identify_file_types(&self, files: Vec<String>) -> BTreeMap<&'static str, Vec<String>> {
        let mut groups: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for file in files {
            groups.entry(category(&file)).or_default().push(file);
        }
        groups
    }

    /// Moves every file of a directory into a sub-folder named after its
    /// category. The todo list stays where it is.
    ///
    /// :param path: Directory to organize
    #[capability(contextual(path))]
    pub fn organize_files_by_type(
        &self,
        path: &str,
    ) -> ToolResult<BTreeMap<&'static str, Vec<String>>> {
        let dir = self.confine(path)?;
        let files = Self::file_names(&dir)?
            .into_iter()
            .filter(|name| name != TODO_FILE)
            .collect();

        let groups = self.identify_file_types(files);
        for (folder, names) in &groups {
            let target = dir.join(folder);
            fs::create_dir_all(&target).map_err(|err| io_failure("create", &target, &err))?;
            for name in names {
                let from = dir.join(name);
                fs::rename(&from, target.join(name))
                    .map_err(|err| io_failure("move", &from, &err))?;
            }
            info!(folder = %folder, files = names.len(), "files moved");
        }
        Ok(groups)
    }

    /// Reads `todo.txt` and turns every reminder line into a task.
    ///
    /// :param path: Directory holding todo.txt
    #[capability(contextual(path), yields_tasks)]
    pub fn read_todo_tasks(&self, path: &str) -> ToolResult<Vec<Value>> {
        let file = self.confine(path)?.join(TODO_FILE);
        let contents = fs::read_to_string(&file).map_err(|err| io_failure("read", &file, &err))?;

        let mut tasks = Vec::new();
        for line in contents.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match reminder(line) {
                Some(message) => tasks.push(json!({
                    "name": "notify",
                    "args": { "message": message },
                })),
                None => debug!(line, "todo line not understood"),
            }
        }
        Ok(tasks)
    }

    /// Delivers a reminder to the user.
    ///
    /// :param message: Reminder text
    #[capability]
    pub fn notify(&self, message: &str) -> bool {
        info!(reminder = message, "reminder");
        true
    }
}

/// Wraps a synchronous capability body as a tool.
fn tool<F>(
    organizer: &Arc<Organizer>,
    body: F,
) -> impl Fn(Arguments) -> Ready<ToolResult<Value>> + Send + Sync + 'static
where
    F: Fn(&Organizer, &Arguments) -> ToolResult<Value> + Send + Sync + 'static,
{
    let organizer = Arc::clone(organizer);
    move |args| ready(body(&organizer, &args))
}

/// Registers every organizer capability.
///
/// # Errors
///
/// Fails when a descriptor is malformed or a name is registered twice.
pub fn registry(
    organizer: Organizer,
    aliases: ArgumentAliases,
) -> anyhow::Result<CapabilityRegistry> {
    let organizer = Arc::new(organizer);
    let mut builder = CapabilityRegistry::builder().with_aliases(aliases);

    builder.register(
        Organizer::get_directory_name_capability()?,
        tool(&organizer, |this, _| Ok(json!(this.get_directory_name()))),
    )?;
    builder.register(
        Organizer::scan_directory_capability()?,
        tool(&organizer, |this, args| {
            Ok(json!(this.scan_directory(args.required_str("path")?)?))
        }),
    )?;
    builder.register(
        Organizer::identify_file_types_capability()?,
        tool(&organizer, |this, args| {
            Ok(json!(this.identify_file_types(args.string_list("files")?)))
        }),
    )?;
    builder.register(
        Organizer::organize_files_by_type_capability()?,
        tool(&organizer, |this, args| {
            Ok(json!(this.organize_files_by_type(args.required_str("path")?)?))
        }),
    )?;
    builder.register(
        Organizer::read_todo_tasks_capability()?,
        tool(&organizer, |this, args| {
            Ok(Value::Array(this.read_todo_tasks(args.required_str("path")?)?))
        }),
    )?;
    builder.register(
        Organizer::notify_capability()?,
        tool(&organizer, |this, args| {
            Ok(json!(this.notify(args.required_str("message")?)))
        }),
    )?;

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot::kernel::{CallOutcome, CallRecord, CallState, Dispatcher};

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["report.PDF", "photo.jpg", "notes.txt", "main.rs", "blob.bin"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::write(
            dir.path().join(TODO_FILE),
            "Remind me to \"water the plants\" via email\nbuy milk\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn categories_follow_extensions() {
        assert_eq!(category("a.PDF"), "PDFs");
        assert_eq!(category("a.tar.gz"), "Archives");
        assert_eq!(category("Makefile"), OTHER_CATEGORY);
    }

    #[test]
    fn reminder_needs_quoted_text() {
        assert_eq!(reminder("Remind me to \"call mom\" via email"), Some("call mom"));
        assert_eq!(reminder("remind me to call mom"), None);
        assert_eq!(reminder("Remind me to \"\""), None);
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let dir = workspace();
        let organizer = Organizer::new(dir.path()).unwrap();
        let err = organizer.scan_directory("..").expect_err("escapes root");
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn organize_moves_everything_but_the_todo_list() {
        let dir = workspace();
        let organizer = Organizer::new(dir.path()).unwrap();

        let groups = organizer.organize_files_by_type(".").unwrap();
        assert_eq!(groups["Images"], ["photo.jpg"]);
        assert!(dir.path().join("PDFs/report.PDF").is_file());
        assert!(dir.path().join("Others/blob.bin").is_file());
        assert_eq!(organizer.scan_directory(".").unwrap(), [TODO_FILE]);
    }

    #[test]
    fn todo_reminders_become_tasks() {
        let dir = workspace();
        let organizer = Organizer::new(dir.path()).unwrap();
        let tasks = organizer.read_todo_tasks(".").unwrap();
        assert_eq!(
            tasks,
            [json!({ "name": "notify", "args": { "message": "water the plants" } })]
        );
    }

    #[tokio::test]
    async fn context_path_drives_the_whole_pass() {
        let dir = workspace();
        let organizer = Organizer::new(dir.path()).unwrap();
        let registry = registry(organizer, ArgumentAliases::builtin()).unwrap();

        let report = Dispatcher::new(Arc::new(registry))
            .dispatch(vec![
                CallRecord::new(0, "get_directory_name", Arguments::new()),
                CallRecord::new(1, "organize_files_by_type", Arguments::new()),
                CallRecord::new(2, "read_todo_tasks", Arguments::new()),
            ])
            .await
            .unwrap();

        assert_eq!(report.count(CallState::Executed), 4);
        let notify = report.entry("2.0").unwrap();
        assert_eq!(notify.name(), "notify");
        assert_eq!(notify.outcome(), Some(&CallOutcome::Succeeded(json!(true))));
        assert!(dir.path().join("Code_Files/main.rs").is_file());
    }
}
