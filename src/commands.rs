//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, bail};
use futures_util::future::try_join_all;
use srcgraph_build::standard_rule_makers;
use srcgraph_core::{
    GraphOutput, MAKEFILE, OutputSummary, RawDependency, RepoConfig, SourceUnit, SymbolIndex,
    build_data_dir, ensure_build_data_dir, load_units, parse_id, save_units,
};
use srcgraph_toolchain::{CommandRunner, Context, DockerSandbox, LocalSandbox, Registry, Sandbox, toolchains};

use crate::SandboxKind;

/// Registry with every bundled toolchain, and a runner for `kind`.
fn context(kind: SandboxKind) -> Context {
    let mut builder = Registry::builder();
    toolchains::register_all(&mut builder);

    let sandbox: Arc<dyn Sandbox> = match kind {
        SandboxKind::Local => Arc::new(LocalSandbox::new().host_environment()),
        SandboxKind::Docker => Arc::new(DockerSandbox::new()),
    };
    Context::new(Arc::new(builder.build()), CommandRunner::new(sandbox))
}

/// Global flags every generated recipe repeats. Recipes run from the
/// repository root, so `--root` is left out.
fn recipe_args(kind: SandboxKind) -> Vec<String> {
    match kind {
        SandboxKind::Local => Vec::new(),
        SandboxKind::Docker => vec!["--sandbox".to_string(), "docker".to_string()],
    }
}

fn load_repo(root: &Path) -> anyhow::Result<RepoConfig> {
    RepoConfig::load(root).with_context(|| format!("loading configuration for {}", root.display()))
}

pub async fn scan(root: PathBuf, kind: SandboxKind, json: bool) -> anyhow::Result<()> {
    let ctx = context(kind);
    let repo = load_repo(&root)?;
    tracing::info!("Scanning {} with the {} sandbox", repo.uri, ctx.runner().sandbox_name());

    let units = ctx
        .scan(&root, &repo)
        .await
        .with_context(|| format!("scanning {}", root.display()))?;
    tracing::info!("Found {} source units", units.len());

    if json {
        let data_dir = build_data_dir(&root);
        save_units(ctx.units(), &units, &data_dir)?;
        println!("{}", serde_json::to_string_pretty(&ctx.units().encode_all(&units)?)?);
    } else {
        for unit in &units {
            println!("{}", ctx.units().make_id(unit.as_ref())?);
        }
    }
    Ok(())
}

pub async fn deps(
    root: PathBuf,
    kind: SandboxKind,
    selectors: Vec<String>,
    resolve: bool,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = context(kind);
    let repo = load_repo(&root)?;
    let units = source_units(&ctx, &root, &repo).await?;
    let selected = select_units(&ctx, &units, &selectors, |variant| {
        ctx.registry().has_lister(variant)
    })?;

    let listed = try_join_all(selected.iter().map(|unit| {
        let ctx = &ctx;
        let root = &root;
        let repo = &repo;
        async move {
            ctx.list_deps(root, unit.as_ref(), repo)
                .await
                .with_context(|| format!("listing dependencies of {}", unit.name()))
        }
    }))
    .await?;
    let raw: Vec<RawDependency> = listed.into_iter().flatten().collect();

    if resolve {
        let repo = repo.with_units(units);
        let edges = ctx.resolve_all(&raw, &repo).await.context("resolving dependencies")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&edges)?);
        } else {
            for edge in &edges {
                println!(
                    "{}@{} -> {} {}@{} {}",
                    edge.from_unit,
                    edge.from_unit_type,
                    edge.to_repo,
                    edge.to_unit,
                    edge.to_unit_type,
                    edge.to_version_string
                );
            }
        }
    } else if json {
        println!("{}", serde_json::to_string_pretty(&raw)?);
    } else {
        for dep in &raw {
            println!("{}@{} {} {}", dep.from_unit, dep.from_unit_type, dep.target_type, dep.target);
        }
    }
    Ok(())
}

pub async fn graph(
    root: PathBuf,
    kind: SandboxKind,
    selectors: Vec<String>,
    json: bool,
    summary: bool,
) -> anyhow::Result<()> {
    let ctx = context(kind);
    let repo = load_repo(&root)?;
    let units = source_units(&ctx, &root, &repo).await?;
    let selected = select_units(&ctx, &units, &selectors, |variant| {
        ctx.registry().has_grapher(variant)
    })?;

    let outputs = try_join_all(selected.iter().map(|unit| {
        let ctx = &ctx;
        let root = &root;
        let repo = &repo;
        async move {
            ctx.graph(root, unit.as_ref(), repo)
                .await
                .with_context(|| format!("graphing {}", unit.name()))
        }
    }))
    .await?;

    let index = SymbolIndex::new();
    let mut merged = GraphOutput::default();
    let mut total = OutputSummary::default();
    for (unit, output) in selected.iter().zip(outputs) {
        let id = ctx.units().make_id(unit.as_ref())?;
        let counts = output.summary();
        if summary {
            tracing::info!("{}: {} symbols, {} refs, {} docs", id, counts.symbols, counts.refs, counts.docs);
        }
        total += counts;
        index.insert_output(id, &output);
        merged.symbols.extend(output.symbols);
        merged.refs.extend(output.refs);
        merged.docs.extend(output.docs);
    }

    let internal = merged.refs.iter().filter(|r| index.resolves(r)).count();
    tracing::info!(
        "Graphed {} units: {} symbols, {} refs ({} to symbols in this run), {} docs",
        selected.len(),
        total.symbols,
        total.refs,
        internal,
        total.docs
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&merged)?);
    }
    Ok(())
}

pub async fn makefile(root: PathBuf, kind: SandboxKind, output_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = context(kind);
    let repo = load_repo(&root)?;
    let units = source_units(&ctx, &root, &repo).await?;
    let repo = repo.with_units(units);

    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(srcgraph_core::BUILD_DATA_DIR));
    let makers = standard_rule_makers(Arc::clone(ctx.registry()), &recipe_args(kind));
    let makefile = makers.create_makefile(&output_dir, &repo)?;
    // Fail here rather than in make
    makefile.build_order()?;

    let data_dir = ensure_build_data_dir(&root)?;
    let path = data_dir.join(MAKEFILE);
    std::fs::write(&path, makefile.to_string())
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("Wrote {} rules to {}", makefile.rules().len(), path.display());

    print!("{makefile}");
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing build data for: {}", root.display());

    srcgraph_core::clear_build_data(&root)?;

    tracing::info!("Build data cleared");
    Ok(())
}

/// Units saved by an earlier `scan --json`, or a fresh scan.
async fn source_units(ctx: &Context, root: &Path, repo: &RepoConfig) -> anyhow::Result<Vec<Arc<dyn SourceUnit>>> {
    if let Some(units) = load_units(ctx.units(), &build_data_dir(root))? {
        return Ok(units);
    }
    ctx.scan(root, repo)
        .await
        .with_context(|| format!("scanning {}", root.display()))
}

/// Units named by `selectors`, each either an ID (`name@Type`) or a bare
/// name. Without selectors, every unit whose variant passes `supported`.
fn select_units(
    ctx: &Context,
    units: &[Arc<dyn SourceUnit>],
    selectors: &[String],
    supported: impl Fn(&str) -> bool,
) -> anyhow::Result<Vec<Arc<dyn SourceUnit>>> {
    if selectors.is_empty() {
        let mut selected = Vec::new();
        for unit in units {
            if supported(ctx.units().variant_of(unit.as_ref())?) {
                selected.push(Arc::clone(unit));
            }
        }
        return Ok(selected);
    }

    let mut selected = Vec::with_capacity(selectors.len());
    for selector in selectors {
        let (name, variant) = if selector.contains(srcgraph_core::ID_SEPARATOR) {
            let (name, variant) = parse_id(selector)?;
            (name, Some(variant))
        } else {
            (selector.clone(), None)
        };

        let mut found = false;
        for unit in units {
            if unit.name() != name {
                continue;
            }
            if let Some(variant) = &variant {
                if ctx.units().variant_of(unit.as_ref())? != variant {
                    continue;
                }
            }
            selected.push(Arc::clone(unit));
            found = true;
        }
        if !found {
            bail!("no source unit matches {selector:?}");
        }
    }
    Ok(selected)
}
