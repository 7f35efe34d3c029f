use anyhow::{Context, Result};
use clap::Parser;
use drive_relink::cache::{Cache, MemoryCache};
use drive_relink::drive::{DriveMetadata, ServiceAccountAuth};
use drive_relink::locate::AssetLocator;
use drive_relink::report::FileReporter;
use drive_relink::util::env as env_util;
use drive_relink::{RelinkConfig, RelinkMode, RelinkPipeline, RelinkStats};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Rewrite Google Drive share links in a product CSV to local asset URLs.
///
/// Audit mode (the default) only reports would-be failures; apply mode writes
/// a rewritten copy of the CSV next to the input.
#[derive(Parser, Debug)]
#[command(name = "relink")]
struct Args {
    /// Product CSV to process.
    input: PathBuf,
    /// Output path for the rewritten CSV (apply mode only).
    /// Defaults to the input path with a `.relinked.csv` extension.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Force apply mode (overrides RELINK_APPLY).
    #[arg(long, conflicts_with = "audit")]
    apply: bool,
    /// Force audit mode (overrides RELINK_APPLY).
    #[arg(long)]
    audit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("relink");
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    env_util::preflight_check(
        "relink",
        &["RELINK_UPLOAD_BASE", "RELINK_CREDENTIALS_PATH"],
        &[
            "RELINK_UPLOAD_BASE",
            "RELINK_REPORT_DIR",
            "RELINK_APPLY",
            "RELINK_IMAGE_COLUMNS",
            "RELINK_IMAGE_EXTS",
            "RELINK_CACHE_TTL_SECS",
        ],
    )?;
    let cfg = RelinkConfig::from_env()?;

    let mode = if args.apply {
        RelinkMode::Apply
    } else if args.audit {
        RelinkMode::Audit
    } else if cfg.apply {
        RelinkMode::Apply
    } else {
        RelinkMode::Audit
    };

    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let auth = ServiceAccountAuth::new(&cfg.credentials_path, &cfg.scope, Arc::clone(&cache))?;
    let resolver = DriveMetadata::new(
        Some(&cfg.api_base),
        auth,
        Arc::clone(&cache),
        cfg.name_cache_ttl,
    )?;
    let finder = AssetLocator::new(&cfg.upload_base, &cfg.image_extensions)?;
    let sink = FileReporter::new(&cfg.report_dir)?;
    let pipeline = RelinkPipeline::new(
        Arc::new(resolver),
        Arc::new(finder),
        Arc::new(sink),
        mode,
        cfg.image_columns.clone(),
    );

    let mut rdr = csv::Reader::from_path(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut wtr = match mode {
        RelinkMode::Apply => {
            let out_path = args
                .output
                .clone()
                .unwrap_or_else(|| default_output(&args.input));
            let mut w = csv::Writer::from_path(&out_path)
                .with_context(|| format!("creating {}", out_path.display()))?;
            w.write_record(&headers)?;
            Some((w, out_path))
        }
        RelinkMode::Audit => None,
    };

    let mut rows = 0usize;
    let mut totals = RelinkStats::default();
    for result in rdr.records() {
        let rec = result.with_context(|| format!("reading row {} of {}", rows + 1, args.input.display()))?;
        let mut row: IndexMap<String, String> = headers
            .iter()
            .cloned()
            .zip(rec.iter().map(str::to_string))
            .collect();
        totals.add(pipeline.transform_record(&mut row).await);
        rows += 1;

        if let Some((w, _)) = wtr.as_mut() {
            w.write_record(
                headers
                    .iter()
                    .map(|h| row.get(h).map(String::as_str).unwrap_or("")),
            )?;
        }
    }

    if let Some((mut w, out_path)) = wtr {
        w.flush()
            .with_context(|| format!("flushing {}", out_path.display()))?;
        println!("[relink] wrote {}", out_path.display());
    }

    println!(
        "[relink] mode={} rows={} tokens={} drive_refs={} rewritten={} failures={}",
        match mode {
            RelinkMode::Apply => "apply",
            RelinkMode::Audit => "audit",
        },
        rows,
        totals.tokens,
        totals.drive_refs,
        totals.rewritten,
        totals.failures
    );

    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("relinked.csv")
}

fn init_tracing() {
    let _ = SubscriberBuilder::default()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}
