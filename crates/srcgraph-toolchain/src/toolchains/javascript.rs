//! JavaScript toolchain: CommonJS packages managed with npm

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use srcgraph_core::{
    DependencyTarget, Doc, GraphOutput, RawDependency, Ref, RepoConfig, RepoUri, Resolution,
    ResolvedTarget, SourceUnit, Symbol, SymbolKey, TaggedUnit, UnitVariant,
};

use crate::command::Command;
use crate::context::{Context, expect_unit};
use crate::dep::{Lister, ResolveCommand, SandboxedResolver};
use crate::error::Result;
use crate::grapher::Grapher;
use crate::registry::RegistryBuilder;
use crate::scan::{SandboxedScanner, ScanCommand};

/// Scanner name.
pub const NPM: &str = "npm";

const SRC_ROOT: &str = "/srcgraph/src";
const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";
const NODE_STDLIB_REPO_URL: &str = "git://github.com/joyent/node.git";
const DEPTOOL: &str = "deptool@~0.0.2";
const JSG: &str = "jsg@0.0.1";

/// A directory of CommonJS modules, usually with a `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonJsPackage {
    /// Directory holding the package.json (or that would hold it).
    pub dir: String,
    /// Empty when the package has no package.json.
    #[serde(rename = "PackageJSONFile", default)]
    pub package_json_file: String,
    #[serde(default)]
    pub lib_files: Vec<String>,
    #[serde(default)]
    pub test_files: Vec<String>,
}

impl SourceUnit for CommonJsPackage {
    fn name(&self) -> &str {
        &self.dir
    }

    fn root_dir(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.lib_files
            .iter()
            .chain(&self.test_files)
            .chain(Some(&self.package_json_file).filter(|f| !f.is_empty()))
            .map(PathBuf::from)
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl UnitVariant for CommonJsPackage {
    const VARIANT: &'static str = "CommonJSPackage";
}

/// One entry of a package.json dependency object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NpmDependency {
    pub name: String,
    /// Version range, tarball URL or git URL.
    pub spec: String,
}

impl DependencyTarget for NpmDependency {
    const TARGET_TYPE: &'static str = "npm-dep";
}

/// `[toolchains.npm]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NpmConfig {
    pub registry: String,
}

impl Default for NpmConfig {
    fn default() -> Self {
        NpmConfig {
            registry: DEFAULT_REGISTRY.to_string(),
        }
    }
}

pub fn register(builder: &mut RegistryBuilder) {
    builder
        .variant::<CommonJsPackage>()
        .scanner(NPM, SandboxedScanner(NpmScan))
        .lister::<CommonJsPackage>(NpmLister)
        .resolver::<NpmDependency>(SandboxedResolver(NpmResolve))
        .grapher::<CommonJsPackage>(JsgGraph);
}

fn node_command<I, S>(argv: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(argv)
        .image("ubuntu:22.04")
        .setup("apt-get update")
        .setup("apt-get install -qy nodejs npm git")
}

/// Finds package.json files and JavaScript sources, then groups the sources
/// into packages.
pub struct NpmScan;

impl ScanCommand for NpmScan {
    fn scan_command(&self, dir: &Path, _repo: &RepoConfig) -> Result<Command> {
        let argv = [
            "find", ".", "-path", "*/node_modules", "-prune", "-o", "-path", "*/.git", "-prune", "-o",
            "(", "-name", "package.json", "-o", "-name", "*.js", ")", "-print",
        ];
        Ok(node_command(argv)
            .mount_ro(dir, SRC_ROOT)
            .dir(SRC_ROOT)
            .transform(packages_from_find))
    }
}

/// Group `find` output into packages: every `.js` file belongs to the
/// package of its deepest enclosing directory holding a package.json, or
/// to a root package without one.
pub fn packages_from_find(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let text = std::str::from_utf8(raw).context("find output is not UTF-8")?;
    let files: Vec<&str> = text
        .lines()
        .map(|line| line.trim().trim_start_matches("./"))
        .filter(|line| !line.is_empty() && *line != ".")
        .collect();

    let mut packages: BTreeMap<String, CommonJsPackage> = BTreeMap::new();
    for file in files.iter().filter(|f| is_package_json(f)) {
        let dir = parent_dir(file);
        packages.insert(
            dir.clone(),
            CommonJsPackage {
                dir,
                package_json_file: file.to_string(),
                ..Default::default()
            },
        );
    }

    for file in files.iter().filter(|f| f.ends_with(".js")) {
        let dir = Path::new(file)
            .ancestors()
            .skip(1)
            .map(|a| if a.as_os_str().is_empty() { ".".to_string() } else { a.to_string_lossy().into_owned() })
            .find(|a| packages.contains_key(a))
            .unwrap_or_else(|| ".".to_string());
        let pkg = packages.entry(dir.clone()).or_insert_with(|| CommonJsPackage {
            dir,
            ..Default::default()
        });
        if is_test_file(file) {
            pkg.test_files.push(file.to_string());
        } else {
            pkg.lib_files.push(file.to_string());
        }
    }

    let units = packages
        .into_values()
        .map(|mut pkg| -> anyhow::Result<TaggedUnit> {
            pkg.lib_files.sort();
            pkg.test_files.sort();
            Ok(TaggedUnit {
                variant: CommonJsPackage::VARIANT.to_string(),
                data: serde_json::to_value(pkg)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(serde_json::to_vec(&units)?)
}

fn is_package_json(file: &str) -> bool {
    Path::new(file).file_name().is_some_and(|n| n == "package.json")
}

fn parent_dir(file: &str) -> String {
    match Path::new(file).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

fn is_test_file(file: &str) -> bool {
    let path = Path::new(file);
    let in_test_dir = path
        .components()
        .any(|c| matches!(c.as_os_str().to_str(), Some("test" | "tests" | "__tests__")));
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    in_test_dir || name.ends_with(".test.js") || name.ends_with("_test.js")
}

/// Reads `dependencies` and `devDependencies` from the package.json.
pub struct NpmLister;

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
}

#[async_trait]
impl Lister for NpmLister {
    async fn list(
        &self,
        _ctx: &Context,
        dir: &Path,
        unit: &dyn SourceUnit,
        _repo: &RepoConfig,
    ) -> Result<Vec<RawDependency>> {
        let pkg = expect_unit::<CommonJsPackage>(unit)?;
        if pkg.package_json_file.is_empty() {
            return Ok(Vec::new());
        }

        let path = dir.join(&pkg.package_json_file);
        let data = tokio::fs::read(&path).await?;
        let manifest: PackageJson = serde_json::from_slice(&data)
            .with_context(|| format!("parsing {}", path.display()))?;

        let mut deps = Vec::with_capacity(manifest.dependencies.len() + manifest.dev_dependencies.len());
        for (name, spec) in manifest.dependencies.into_iter().chain(manifest.dev_dependencies) {
            let dep = RawDependency::new(&NpmDependency { name, spec })?;
            deps.push(dep.with_file(pkg.package_json_file.clone()));
        }
        Ok(deps)
    }
}

/// Resolves npm dependencies by asking `npm-deptool` where they come from.
pub struct NpmResolve;

impl ResolveCommand for NpmResolve {
    fn resolve_command(&self, dep: &RawDependency, repo: &RepoConfig) -> Result<Command> {
        let npm_dep: NpmDependency = dep.decode_target()?;
        let config: NpmConfig = repo.toolchain_config(NPM)?.unwrap_or_default();
        let spec = format!("{}@{}", npm_dep.name, npm_dep.spec);

        let registry = config.registry.clone();
        let label = spec.clone();
        Ok(node_command(["npm-deptool".to_string(), spec])
            .setup(format!("npm install -g {DEPTOOL}"))
            .var("npm_config_registry", config.registry)
            .transform(move |raw| target_from_deptool(&registry, &label, raw)))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DeptoolPackage {
    #[serde(rename = "_resolved", default)]
    resolved: String,
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    repository: Value,
}

/// Turn `npm-deptool` output (one package keyed by name) into a resolved
/// target, or `null` when the package names no repository.
pub fn target_from_deptool(registry: &str, spec: &str, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let packages: BTreeMap<String, DeptoolPackage> = serde_json::from_slice(raw)?;
    let mut packages = packages.into_values();
    let pkg = match (packages.next(), packages.next()) {
        (Some(pkg), None) => pkg,
        (None, _) => anyhow::bail!("npm-deptool printed nothing for {spec}"),
        (Some(_), Some(_)) => anyhow::bail!("npm-deptool returned {} packages for {spec}", packages.len() + 2),
    };

    let (clone_url, rev_spec) = if pkg.resolved.starts_with(registry) {
        // Registry tarball: only the manifest knows the source repository.
        (repository_url(&pkg.repository), String::new())
    } else {
        // Tarball or git URL; a fragment names the revision.
        match pkg.resolved.split_once('#') {
            Some((url, fragment)) => (url.to_string(), fragment.to_string()),
            None => (pkg.resolved.clone(), String::new()),
        }
    };

    if clone_url.is_empty() {
        tracing::debug!("{} has no repository URL", spec);
        return Ok(b"null".to_vec());
    }

    Ok(serde_json::to_vec(&ResolvedTarget {
        to_repo_clone_url: clone_url,
        to_unit: ".".to_string(),
        to_unit_type: CommonJsPackage::VARIANT.to_string(),
        to_version_string: pkg.id,
        to_rev_spec: rev_spec,
    })?)
}

/// package.json allows both `"repository": "url"` and `{"type", "url"}`.
fn repository_url(repository: &Value) -> String {
    match repository {
        Value::String(url) => url.clone(),
        Value::Object(fields) => fields
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// Graphs a package with `jsg`, then re-resolves references into
/// `node_modules` to the repositories those packages come from.
pub struct JsgGraph;

fn jsg_command(dir: &Path, pkg: &CommonJsPackage, repo: &RepoUri) -> Command {
    let argv = ["jsg", "--plugin", "node"]
        .into_iter()
        .map(str::to_string)
        .chain(pkg.lib_files.iter().chain(&pkg.test_files).cloned());

    let pkg = pkg.clone();
    let repo = repo.clone();
    node_command(argv)
        .setup(format!("npm install -g {JSG}"))
        .mount_ro(dir, SRC_ROOT)
        .dir(SRC_ROOT)
        .transform(move |raw| graph_from_jsg(&repo, &pkg, raw))
}

#[async_trait]
impl Grapher for JsgGraph {
    async fn graph(
        &self,
        ctx: &Context,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> Result<GraphOutput> {
        let pkg = expect_unit::<CommonJsPackage>(unit)?;
        let output: GraphOutput = ctx.runner().run(jsg_command(dir, pkg, &repo.uri)).await?;
        resolve_module_refs(ctx, dir, pkg, repo, output).await
    }
}

/// Package name and in-package path of a symbol path running through
/// `node_modules`, e.g. `node_modules/@types/node/fs.d.ts/readFile`.
fn split_module_path(path: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    let at = parts.iter().rposition(|part| *part == "node_modules")?;
    let rest = &parts[at + 1..];
    let name_len = if rest.first()?.starts_with('@') { 2 } else { 1 };
    if rest.len() < name_len {
        return None;
    }
    Some((rest[..name_len].join("/"), rest[name_len..].join("/")))
}

/// Point references into `node_modules` at the package each one lands in,
/// resolving that package the same way `deps --resolve` would. References
/// into packages without a known repository are dropped.
///
/// Declared dependencies are resolved with their package.json spec, any
/// other package with `*`. Each package is resolved once.
pub async fn resolve_module_refs(
    ctx: &Context,
    dir: &Path,
    pkg: &CommonJsPackage,
    repo: &RepoConfig,
    mut output: GraphOutput,
) -> Result<GraphOutput> {
    let mut declared = HashMap::new();
    for dep in ctx.list_deps(dir, pkg, repo).await? {
        declared.insert(dep.decode_target::<NpmDependency>()?.name, dep);
    }

    let mut targets: HashMap<String, Option<ResolvedTarget>> = HashMap::new();
    let mut refs = Vec::with_capacity(output.refs.len());
    for mut r in std::mem::take(&mut output.refs) {
        let module = if r.def || r.symbol_repo != repo.uri { None } else { split_module_path(&r.symbol_path) };
        let Some((name, path)) = module else {
            refs.push(r);
            continue;
        };

        if !targets.contains_key(&name) {
            let dep = match declared.get(&name) {
                Some(dep) => dep.clone(),
                None => RawDependency::new(&NpmDependency {
                    name: name.clone(),
                    spec: "*".to_string(),
                })?
                .with_origin(&pkg.dir, CommonJsPackage::VARIANT),
            };
            let target = match ctx.resolve(&dep, repo).await? {
                Resolution::Resolved(target) if !target.to_repo_clone_url.is_empty() => Some(target),
                _ => {
                    tracing::debug!("Dropping references into unresolved package {}", name);
                    None
                }
            };
            targets.insert(name.clone(), target);
        }

        if let Some(Some(target)) = targets.get(&name) {
            r.symbol_repo = RepoUri::from_clone_url(&target.to_repo_clone_url);
            r.symbol_unit = target.to_unit.clone();
            r.symbol_unit_type = target.to_unit_type.clone();
            r.symbol_path = path;
            refs.push(r);
        }
    }
    output.refs = refs;
    Ok(output)
}

#[derive(Debug, Default, Deserialize)]
struct JsgOutput {
    #[serde(default)]
    symbols: Vec<JsgSymbol>,
    #[serde(default)]
    refs: Vec<JsgRef>,
}

#[derive(Debug, Default, Deserialize)]
struct JsgKey {
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    module: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct JsgSpan {
    #[serde(default)]
    file: String,
    #[serde(default)]
    start: u32,
    #[serde(default)]
    end: u32,
}

#[derive(Debug, Default, Deserialize)]
struct JsgSymbol {
    id: JsgKey,
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: String,
    #[serde(default, rename = "type")]
    type_expr: String,
    #[serde(default)]
    exported: bool,
    #[serde(default)]
    defn: JsgSpan,
    #[serde(default)]
    doc: String,
}

#[derive(Debug, Default, Deserialize)]
struct JsgRef {
    target: JsgKey,
    #[serde(default)]
    def: bool,
    #[serde(flatten)]
    span: JsgSpan,
}

fn jsg_path(key: &JsgKey) -> String {
    [key.module.as_str(), key.path.as_str()]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Convert `jsg` output for `pkg` into the canonical graph schema.
///
/// Every symbol also gets a definition ref. References into `node_modules`
/// keep their full path and point at this package until
/// [`resolve_module_refs`] rewrites them.
pub fn graph_from_jsg(repo: &RepoUri, pkg: &CommonJsPackage, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let jsg: JsgOutput = serde_json::from_slice(raw).context("decoding jsg output")?;
    let mut out = GraphOutput::default();

    for js in jsg.symbols {
        let key = SymbolKey {
            repo: repo.clone(),
            unit_type: CommonJsPackage::VARIANT.to_string(),
            unit: pkg.dir.clone(),
            path: jsg_path(&js.id),
        };
        let callable = matches!(js.kind.as_str(), "func" | "function" | "method");
        let kind = match js.kind.as_str() {
            "func" | "function" | "method" => "func",
            "class" | "type" => "type",
            "module" => "module",
            "property" | "field" => "field",
            _ => "var",
        };

        out.refs.push(Ref {
            symbol_repo: key.repo.clone(),
            symbol_unit_type: key.unit_type.clone(),
            symbol_unit: key.unit.clone(),
            symbol_path: key.path.clone(),
            def: true,
            repo: repo.clone(),
            unit_type: key.unit_type.clone(),
            unit: key.unit.clone(),
            file: js.defn.file.clone(),
            start: js.defn.start,
            end: js.defn.end,
        });
        if !js.doc.trim().is_empty() {
            out.docs.push(Doc {
                key: key.clone(),
                format: "text/plain".to_string(),
                data: js.doc,
                file: js.defn.file.clone(),
                start: js.defn.start,
                end: js.defn.end,
            });
        }
        out.symbols.push(Symbol {
            name: if js.name.is_empty() { js.id.path.rsplit('/').next().unwrap_or_default().to_string() } else { js.name },
            key,
            kind: kind.to_string(),
            type_expr: js.type_expr,
            file: js.defn.file,
            def_start: js.defn.start,
            def_end: js.defn.end,
            exported: js.exported,
            callable,
        });
    }

    for jr in jsg.refs {
        let (symbol_repo, symbol_unit) = match jr.target.namespace.as_str() {
            "node" => (RepoUri::from_clone_url(NODE_STDLIB_REPO_URL), ".".to_string()),
            _ => (repo.clone(), pkg.dir.clone()),
        };
        out.refs.push(Ref {
            symbol_repo,
            symbol_unit_type: CommonJsPackage::VARIANT.to_string(),
            symbol_unit,
            symbol_path: jsg_path(&jr.target),
            def: jr.def,
            repo: repo.clone(),
            unit_type: CommonJsPackage::VARIANT.to_string(),
            unit: pkg.dir.clone(),
            file: jr.span.file,
            start: jr.span.start,
            end: jr.span.end,
        });
    }

    Ok(serde_json::to_vec(&out)?)
}
