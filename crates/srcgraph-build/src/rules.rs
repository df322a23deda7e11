//! Standard analysis stages as rule makers
//!
//! Each stage writes JSON under the output directory, one file per unit:
//!
//! ```text
//! <out>/units.json
//! <out>/<unit>/<variant>.deps.json
//! <out>/<unit>/<variant>.resolved_deps.json
//! <out>/<unit>/<variant>.graph.json
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use srcgraph_core::{RepoConfig, SourceUnit, UNITS_FILE};
use srcgraph_toolchain::Registry;

use crate::makefile::RuleMakers;
use crate::rule::BuildRule;

/// Program the generated recipes invoke.
const PROGRAM: &str = "srcgraph";

pub fn units_target(output_dir: &Path) -> String {
    path_string(&output_dir.join(UNITS_FILE))
}

pub fn deps_target(output_dir: &Path, unit: &str, variant: &str) -> String {
    unit_file(output_dir, unit, variant, "deps.json")
}

pub fn resolved_deps_target(output_dir: &Path, unit: &str, variant: &str) -> String {
    unit_file(output_dir, unit, variant, "resolved_deps.json")
}

pub fn graph_target(output_dir: &Path, unit: &str, variant: &str) -> String {
    unit_file(output_dir, unit, variant, "graph.json")
}

/// `scan`, `deps`, `depresolve` and `graph`, in that order.
///
/// Units come from `RepoConfig::source_units`; a unit only gets the stages
/// its variant has plugins for. `global_args` go before the subcommand of
/// every recipe, so stages run the way the Makefile was generated
/// (e.g. `--sandbox docker`).
pub fn standard_rule_makers(registry: Arc<Registry>, global_args: &[String]) -> RuleMakers {
    let program: Arc<str> = program_invocation(global_args).into();
    let mut makers = RuleMakers::new();

    let prog = Arc::clone(&program);
    makers.register("scan", move |_repo, out, _rules| Ok(scan_rules(&prog, out)));

    let (reg, prog) = (Arc::clone(&registry), Arc::clone(&program));
    makers.register("deps", move |repo, out, _rules| deps_rules(&reg, &prog, repo, out));

    let (reg, prog) = (Arc::clone(&registry), Arc::clone(&program));
    makers.register("depresolve", move |repo, out, rules| {
        depresolve_rules(&reg, &prog, repo, out, rules)
    });

    makers.register("graph", move |repo, out, _rules| {
        graph_rules(&registry, &program, repo, out)
    });
    makers
}

fn program_invocation(global_args: &[String]) -> String {
    std::iter::once(PROGRAM.to_string())
        .chain(global_args.iter().map(|arg| shell_word(arg)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn scan_rules(program: &str, out: &Path) -> Vec<BuildRule> {
    vec![
        BuildRule::new(units_target(out))
            .recipe("mkdir -p $(@D)")
            .recipe(format!("{program} scan --json 1> $@")),
    ]
}

fn deps_rules(
    registry: &Registry,
    program: &str,
    repo: &RepoConfig,
    out: &Path,
) -> anyhow::Result<Vec<BuildRule>> {
    let mut rules = Vec::new();
    for unit in &repo.source_units {
        let variant = registry.units().variant_of(unit.as_ref())?;
        if !registry.has_lister(variant) {
            continue;
        }
        let id = registry.units().make_id(unit.as_ref())?;
        rules.push(
            BuildRule::new(deps_target(out, unit.name(), variant))
                .prereqs(unit_paths(unit.as_ref()))
                .prereq(units_target(out))
                .recipe("mkdir -p $(@D)")
                .recipe(format!("{program} deps --json {} 1> $@", quote(id.as_str()))),
        );
    }
    Ok(rules)
}

/// One resolve rule per raw dependency rule already made.
fn depresolve_rules(
    registry: &Registry,
    program: &str,
    repo: &RepoConfig,
    out: &Path,
    existing: &[BuildRule],
) -> anyhow::Result<Vec<BuildRule>> {
    let mut rules = Vec::new();
    for unit in &repo.source_units {
        let variant = registry.units().variant_of(unit.as_ref())?;
        if !registry.has_lister(variant) {
            continue;
        }
        let id = registry.units().make_id(unit.as_ref())?;
        let deps = deps_target(out, unit.name(), variant);
        if !existing.iter().any(|r| r.target == deps) {
            return Err(anyhow!("no raw dependency rule for {id}"));
        }
        rules.push(
            BuildRule::new(resolved_deps_target(out, unit.name(), variant))
                .prereq(deps)
                .recipe("mkdir -p $(@D)")
                .recipe(format!(
                    "{program} deps --resolve --json {} 1> $@",
                    quote(id.as_str())
                )),
        );
    }
    Ok(rules)
}

fn graph_rules(
    registry: &Registry,
    program: &str,
    repo: &RepoConfig,
    out: &Path,
) -> anyhow::Result<Vec<BuildRule>> {
    let mut rules = Vec::new();
    for unit in &repo.source_units {
        let variant = registry
            .units()
            .variant_of(unit.as_ref())
            .with_context(|| format!("graphing unit {}", unit.name()))?;
        if !registry.has_grapher(variant) {
            tracing::debug!("No grapher for {}, skipping {}", variant, unit.name());
            continue;
        }
        let id = registry.units().make_id(unit.as_ref())?;
        rules.push(
            BuildRule::new(graph_target(out, unit.name(), variant))
                .prereqs(unit_paths(unit.as_ref()))
                .recipe("mkdir -p $(@D)")
                .recipe(format!(
                    "{program} graph --json --no-summary {} 1> $@",
                    quote(id.as_str())
                )),
        );
    }
    Ok(rules)
}

fn unit_file(output_dir: &Path, unit: &str, variant: &str, suffix: &str) -> String {
    path_string(&unit_data_dir(output_dir, unit).join(format!("{variant}.{suffix}")))
}

/// Directory for one unit's outputs. The repository-wide unit `.` maps to
/// the output directory itself.
fn unit_data_dir(output_dir: &Path, unit: &str) -> PathBuf {
    let mut dir = output_dir.to_path_buf();
    for component in Path::new(unit).components() {
        match component {
            Component::Normal(part) => dir.push(part),
            Component::ParentDir => dir.push("_"),
            _ => {}
        }
    }
    dir
}

fn unit_paths(unit: &dyn SourceUnit) -> Vec<String> {
    unit.paths().iter().map(|p| path_string(p)).collect()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// `arg` as is when the shell would not split or expand it.
fn shell_word(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | '@'));
    if plain { arg.to_string() } else { quote(arg) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srcgraph_core::RepoUri;
    use srcgraph_toolchain::toolchains::{self, javascript::CommonJsPackage, python::PythonPackage};

    fn registry() -> Arc<Registry> {
        let mut builder = Registry::builder();
        toolchains::register_all(&mut builder);
        Arc::new(builder.build())
    }

    fn repo(units: Vec<Arc<dyn SourceUnit>>) -> RepoConfig {
        RepoConfig::new(RepoUri::new("github.com/example/app")).with_units(units)
    }

    fn web_package() -> Arc<dyn SourceUnit> {
        Arc::new(CommonJsPackage {
            dir: "web".to_string(),
            package_json_file: "web/package.json".to_string(),
            lib_files: vec!["web/index.js".to_string()],
            test_files: vec![],
        })
    }

    #[test]
    fn test_unit_data_dir() {
        let out = Path::new(".srcgraph");
        assert_eq!(unit_data_dir(out, "."), PathBuf::from(".srcgraph"));
        assert_eq!(unit_data_dir(out, "lib/web"), PathBuf::from(".srcgraph/lib/web"));
        assert_eq!(unit_data_dir(out, "../up"), PathBuf::from(".srcgraph/_/up"));
        assert_eq!(
            graph_target(out, ".", "PythonPackage"),
            ".srcgraph/PythonPackage.graph.json"
        );
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("web@CommonJSPackage"), "'web@CommonJSPackage'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(shell_word("--sandbox"), "--sandbox");
        assert_eq!(shell_word("my repo"), "'my repo'");
        assert_eq!(shell_word(""), "''");
    }

    #[test]
    fn test_recipes_carry_global_args() {
        let python: Arc<dyn SourceUnit> = Arc::new(PythonPackage {});
        let repo = repo(vec![web_package(), python]);
        let args = vec!["--sandbox".to_string(), "docker".to_string()];
        let makefile = standard_rule_makers(registry(), &args)
            .create_makefile(Path::new("out"), &repo)
            .unwrap();

        let recipes: Vec<&String> = makefile
            .rules()
            .iter()
            .flat_map(|r| r.recipe.iter())
            .filter(|line| line.starts_with(PROGRAM))
            .collect();
        assert_eq!(recipes.len(), 6);
        assert!(recipes.iter().all(|line| line.starts_with("srcgraph --sandbox docker ")));

        let graph = makefile.rule("out/web/CommonJSPackage.graph.json").unwrap();
        assert_eq!(
            graph.recipe[1],
            "srcgraph --sandbox docker graph --json --no-summary 'web@CommonJSPackage' 1> $@"
        );
    }

    #[test]
    fn test_standard_makefile() {
        let python: Arc<dyn SourceUnit> = Arc::new(PythonPackage {});
        let repo = repo(vec![web_package(), python]);
        let makers = standard_rule_makers(registry(), &[]);
        assert_eq!(makers.names(), vec!["scan", "deps", "depresolve", "graph"]);

        let makefile = makers.create_makefile(Path::new("out"), &repo).unwrap();
        let targets: Vec<&str> = makefile.targets().collect();
        assert_eq!(
            targets,
            vec![
                "all",
                "out/units.json",
                "out/web/CommonJSPackage.deps.json",
                "out/PythonPackage.deps.json",
                "out/web/CommonJSPackage.resolved_deps.json",
                "out/PythonPackage.resolved_deps.json",
                // Python has no grapher.
                "out/web/CommonJSPackage.graph.json",
                ".DELETE_ON_ERROR",
            ]
        );

        let deps = makefile.rule("out/web/CommonJSPackage.deps.json").unwrap();
        assert_eq!(deps.prereqs, vec!["web/index.js", "web/package.json", "out/units.json"]);
        assert_eq!(deps.recipe[1], "srcgraph deps --json 'web@CommonJSPackage' 1> $@");

        let resolved = makefile
            .rule("out/PythonPackage.resolved_deps.json")
            .unwrap();
        assert_eq!(resolved.prereqs, vec!["out/PythonPackage.deps.json"]);
        assert_eq!(resolved.recipe[1], "srcgraph deps --resolve --json '.@PythonPackage' 1> $@");

        let order: Vec<&str> = makefile
            .build_order()
            .unwrap()
            .into_iter()
            .map(|r| r.target.as_str())
            .collect();
        let pos = |t: &str| order.iter().position(|o| *o == t).unwrap();
        assert!(pos("out/units.json") < pos("out/web/CommonJSPackage.deps.json"));
        assert!(
            pos("out/web/CommonJSPackage.deps.json") < pos("out/web/CommonJSPackage.resolved_deps.json")
        );
        assert_eq!(order.last(), Some(&"all"));
    }

    #[test]
    fn test_resolve_needs_deps_rule() {
        let registry = registry();
        let repo = repo(vec![web_package()]);
        let out = Path::new("out");

        let err = depresolve_rules(&registry, PROGRAM, &repo, out, &[]).unwrap_err();
        assert!(err.to_string().contains("web@CommonJSPackage"));

        let deps = deps_rules(&registry, PROGRAM, &repo, out).unwrap();
        let resolved = depresolve_rules(&registry, PROGRAM, &repo, out, &deps).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].prereqs, vec![deps[0].target.clone()]);
    }

    #[test]
    fn test_unregistered_unit_fails_named_maker() {
        #[derive(Debug)]
        struct Stray;
        impl SourceUnit for Stray {
            fn name(&self) -> &str {
                "stray"
            }
            fn root_dir(&self) -> PathBuf {
                PathBuf::from("stray")
            }
            fn paths(&self) -> Vec<PathBuf> {
                Vec::new()
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let stray: Arc<dyn SourceUnit> = Arc::new(Stray);
        let err = standard_rule_makers(registry(), &[])
            .create_makefile(Path::new("out"), &repo(vec![stray]))
            .unwrap_err();
        match err {
            crate::BuildError::RuleMaker { name, .. } => assert_eq!(name, "deps"),
            other => panic!("Expected RuleMaker, got {other:?}"),
        }
    }
}
