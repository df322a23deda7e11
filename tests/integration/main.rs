//! Integration tests for srcgraph
//!
//! These tests verify that the registries, the local sandbox and the rule
//! assembler work together, and that the CLI drives them.

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use srcgraph_build::{graph_target, standard_rule_makers};
use srcgraph_core::{
    GraphOutput, RepoConfig, RepoUri, SourceUnit, Symbol, SymbolIndex, SymbolKey, TaggedUnit, UnitVariant,
};
use srcgraph_toolchain::{
    Command, CommandRunner, Context, GraphCommand, LocalSandbox, Registry, SandboxedGrapher, SandboxedScanner,
    ScanCommand, expect_unit, toolchains,
};
use tempfile::TempDir;

fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (path, content) in structure {
        let full_path = temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }
    temp_dir
}

fn srcgraph(root: &Path, args: &[&str]) -> std::process::Output {
    Process::new(env!("CARGO_BIN_EXE_srcgraph"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute srcgraph")
}

/// A directory of shell scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ShellScripts {
    name: String,
    files: Vec<String>,
}

impl SourceUnit for ShellScripts {
    fn name(&self) -> &str {
        &self.name
    }

    fn root_dir(&self) -> PathBuf {
        PathBuf::from(&self.name)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(PathBuf::from).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl UnitVariant for ShellScripts {
    const VARIANT: &'static str = "ShellScripts";
}

/// Lists `*.sh` under the mounted repository as a single unit.
struct ShellScan;

impl ScanCommand for ShellScan {
    fn scan_command(&self, dir: &Path, _repo: &RepoConfig) -> srcgraph_toolchain::Result<Command> {
        Ok(Command::new(["find", ".", "-name", "*.sh"])
            .mount_ro(dir, "/src")
            .dir("/src")
            .transform(|raw| {
                let mut files: Vec<String> = std::str::from_utf8(raw)?
                    .lines()
                    .map(|l| l.trim_start_matches("./").to_string())
                    .collect();
                if files.is_empty() {
                    return Ok(b"[]".to_vec());
                }
                files.sort();
                let unit = ShellScripts {
                    name: "scripts".to_string(),
                    files,
                };
                Ok(serde_json::to_vec(&[TaggedUnit {
                    variant: ShellScripts::VARIANT.to_string(),
                    data: serde_json::to_value(unit)?,
                }])?)
            }))
    }
}

/// Every `name() {` line is a function definition.
struct ShellGraph;

impl GraphCommand for ShellGraph {
    fn graph_command(
        &self,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> srcgraph_toolchain::Result<Command> {
        let scripts = expect_unit::<ShellScripts>(unit)?;
        let mut argv = vec!["grep".to_string(), "-H".to_string(), "-o".to_string(), "^[a-z_]*()".to_string()];
        argv.extend(scripts.files.iter().cloned());

        let repo_uri = repo.uri.clone();
        let unit_name = scripts.name.clone();
        Ok(Command::new(argv)
            .mount_ro(dir, "/src")
            .dir("/src")
            .transform(move |raw| {
                let symbols = std::str::from_utf8(raw)?
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .map(|(file, def)| {
                        let name = def.trim_end_matches("()");
                        Symbol {
                            key: SymbolKey {
                                repo: repo_uri.clone(),
                                unit_type: ShellScripts::VARIANT.to_string(),
                                unit: unit_name.clone(),
                                path: format!("{file}/{name}"),
                            },
                            name: name.to_string(),
                            kind: "func".to_string(),
                            file: file.to_string(),
                            ..Default::default()
                        }
                    })
                    .collect();
                Ok(serde_json::to_vec(&GraphOutput {
                    symbols,
                    ..Default::default()
                })?)
            }))
    }
}

fn shell_context() -> Context {
    let mut builder = Registry::builder();
    builder
        .variant::<ShellScripts>()
        .scanner("shell", SandboxedScanner(ShellScan))
        .grapher::<ShellScripts>(SandboxedGrapher(ShellGraph));
    Context::new(
        Arc::new(builder.build()),
        CommandRunner::new(Arc::new(LocalSandbox::new())),
    )
}

/// Scan and graph through the local sandbox with a toolchain defined
/// outside the library crates.
#[tokio::test]
async fn test_custom_toolchain_scan_and_graph() {
    let repo_dir = create_repo_with_structure(&[
        ("bin/build.sh", "build() {\n  make\n}\nclean() {\n  rm -rf out\n}\n"),
        ("bin/deploy.sh", "deploy() {\n  scp out host:\n}\n"),
        ("README.md", "# scripts\n"),
    ]);
    let ctx = shell_context();
    let repo = RepoConfig::new(RepoUri::new("github.com/example/scripts"));

    let units = ctx.scan(repo_dir.path(), &repo).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].paths(), vec![PathBuf::from("bin/build.sh"), PathBuf::from("bin/deploy.sh")]);

    let output = ctx.graph(repo_dir.path(), units[0].as_ref(), &repo).await.unwrap();
    let mut names: Vec<&str> = output.symbols.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["build", "clean", "deploy"]);

    let index = SymbolIndex::new();
    index.insert_output(ctx.units().make_id(units[0].as_ref()).unwrap(), &output);
    assert_eq!(index.len(), 3);
    assert_eq!(index.lookup(&output.symbols[0].key).as_ref(), Some(&output.symbols[0]));

    // Host files are untouched by sandboxed runs
    assert_eq!(
        fs::read_to_string(repo_dir.path().join("bin/deploy.sh")).unwrap(),
        "deploy() {\n  scp out host:\n}\n"
    );
}

/// Rule assembly over units scanned in a sandbox.
#[tokio::test]
async fn test_makefile_from_scanned_units() {
    let repo_dir = create_repo_with_structure(&[("run.sh", "main() {\n  true\n}\n")]);
    let ctx = shell_context();
    let repo = RepoConfig::new(RepoUri::new("github.com/example/scripts"));
    let units = ctx.scan(repo_dir.path(), &repo).await.unwrap();
    let repo = repo.with_units(units);

    let out = Path::new(".srcgraph");
    let makefile = standard_rule_makers(Arc::clone(ctx.registry()), &[])
        .create_makefile(out, &repo)
        .unwrap();

    let targets: Vec<&str> = makefile.targets().collect();
    assert_eq!(
        targets,
        vec![
            "all",
            ".srcgraph/units.json",
            ".srcgraph/scripts/ShellScripts.graph.json",
            ".DELETE_ON_ERROR"
        ]
    );
    let graph_rule = makefile.rule(&graph_target(out, "scripts", "ShellScripts")).unwrap();
    assert_eq!(graph_rule.prereqs, vec!["run.sh"]);
    assert!(makefile.to_string().starts_with("all: .srcgraph/units.json .srcgraph/scripts/ShellScripts.graph.json\n"));
}

/// Bundled and custom toolchains share one registry.
#[test]
fn test_bundled_and_custom_toolchains_together() {
    let mut builder = Registry::builder();
    toolchains::register_all(&mut builder)
        .variant::<ShellScripts>()
        .scanner("shell", SandboxedScanner(ShellScan));
    let registry = builder.build();

    assert_eq!(registry.scanners().count(), 3);
    assert!(registry.units().is_registered("ShellScripts"));
    assert!(!registry.has_lister("ShellScripts"));
}

#[test]
fn test_cli_invocation() {
    let output = Process::new(env!("CARGO_BIN_EXE_srcgraph"))
        .arg("--help")
        .output()
        .expect("Failed to execute srcgraph");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("srcgraph"));
    assert!(stdout.contains("Source unit discovery, dependency resolution and symbol graphing"));
}

const PACKAGE_JSON: &str = r#"{
  "name": "web",
  "dependencies": {"left-pad": "^1.3.0"},
  "devDependencies": {"mocha": "10.0.0"}
}"#;

fn node_and_python_repo() -> TempDir {
    create_repo_with_structure(&[
        ("web/package.json", PACKAGE_JSON),
        ("web/index.js", "module.exports = 1;\n"),
        ("requirements.txt", "flask==2.1.0\n"),
    ])
}

#[test]
fn test_cli_scan() {
    let repo_dir = node_and_python_repo();
    let output = srcgraph(repo_dir.path(), &["scan"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<&str> = stdout.lines().collect();
    assert_eq!(ids, vec!["web@CommonJSPackage", ".@PythonPackage"]);
}

#[test]
fn test_cli_scan_json_saves_units() {
    let repo_dir = node_and_python_repo();
    let output = srcgraph(repo_dir.path(), &["scan", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let printed: Vec<TaggedUnit> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(printed.len(), 2);
    assert_eq!(printed[0].variant, "CommonJSPackage");

    let saved = fs::read(repo_dir.path().join(".srcgraph/units.json")).unwrap();
    let saved: Vec<TaggedUnit> = serde_json::from_slice(&saved).unwrap();
    assert_eq!(saved, printed);

    let cleared = srcgraph(repo_dir.path(), &["clear"]);
    assert!(cleared.status.success());
    assert!(!repo_dir.path().join(".srcgraph").exists());
}

#[test]
fn test_cli_deps_for_one_unit() {
    let repo_dir = node_and_python_repo();
    let output = srcgraph(repo_dir.path(), &["deps", "--json", "web@CommonJSPackage"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let deps: Vec<srcgraph_core::RawDependency> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(deps.len(), 2);
    assert!(deps.iter().all(|d| d.target_type == "npm-dep"));
    assert!(deps.iter().all(|d| d.from_unit == "web" && d.from_unit_type == "CommonJSPackage"));
}

#[test]
fn test_cli_unknown_unit_fails() {
    let repo_dir = node_and_python_repo();
    let output = srcgraph(repo_dir.path(), &["graph", "nope@CommonJSPackage"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no source unit matches"));
}

#[test]
fn test_cli_makefile() {
    let repo_dir = node_and_python_repo();
    let output = srcgraph(repo_dir.path(), &["makefile"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let printed = String::from_utf8_lossy(&output.stdout).into_owned();
    assert!(printed.starts_with("all: .srcgraph/units.json"));
    assert!(printed.trim_end().ends_with(".DELETE_ON_ERROR:"));
    assert!(printed.contains(".srcgraph/web/CommonJSPackage.graph.json: web/index.js web/package.json\n"));
    assert!(printed.contains("\tsrcgraph deps --resolve --json '.@PythonPackage' 1> $@\n"));

    let written = fs::read_to_string(repo_dir.path().join(".srcgraph/Makefile")).unwrap();
    assert_eq!(written, printed);
}

#[test]
fn test_cli_makefile_recipes_keep_sandbox() {
    let repo_dir = node_and_python_repo();
    // Saved units let the docker run skip scanning.
    let scanned = srcgraph(repo_dir.path(), &["scan", "--json"]);
    assert!(scanned.status.success(), "{}", String::from_utf8_lossy(&scanned.stderr));

    let output = srcgraph(repo_dir.path(), &["--sandbox", "docker", "makefile"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let printed = String::from_utf8_lossy(&output.stdout).into_owned();
    assert!(printed.contains("\tsrcgraph --sandbox docker scan --json 1> $@\n"));
    assert!(printed.contains("\tsrcgraph --sandbox docker deps --resolve --json '.@PythonPackage' 1> $@\n"));
    assert!(!printed.contains("\tsrcgraph deps"));
}

#[test]
fn test_cli_graph_logs_to_stderr_only() {
    let repo_dir = create_repo_with_structure(&[("requirements.txt", "flask==2.1.0\n")]);
    let output = srcgraph(repo_dir.path(), &["graph", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    // stdout is nothing but the graph
    let graph: GraphOutput = serde_json::from_slice(&output.stdout).unwrap();
    assert!(graph.symbols.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Graphed 0 units"));
}
