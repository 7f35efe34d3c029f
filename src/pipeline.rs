//! The relink pipeline: extraction → resolution → location → dedup → fallback.
//!
//! One record at a time, tokens strictly in encounter order. Every failure
//! degrades to keeping the original reference and emitting a failure row; the
//! pipeline always returns a field value, it never aborts an import.

use chrono::Utc;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::extract::{extract_drive_id, split_references};
use crate::locate::AssetFinder;
use crate::drive::NameResolver;
use crate::report::{FailureSink, ResolutionRecord};

pub const REASON_NAME_NOT_RESOLVED: &str = "drive_filename_not_resolved";
pub const REASON_IMAGE_NOT_FOUND: &str = "image_not_found_on_cco";

/// Column names consulted for the failure-row context, in order.
const SKU_COLUMNS: [&str; 3] = ["SKU", "sku", "Sku"];
const NAME_COLUMNS: [&str; 4] = ["Name", "name", "product_name", "post_title"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelinkMode {
    /// Report-only: failures are logged, the field is returned verbatim.
    Audit,
    /// Rewrite the field with resolved asset URLs.
    Apply,
}

/// Identifies the record a failure row belongs to.
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    pub sku: String,
    pub product_name: String,
}

impl RecordContext {
    pub fn from_record(record: &IndexMap<String, String>) -> Self {
        let pick = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|c| record.get(*c))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            sku: pick(&SKU_COLUMNS),
            product_name: pick(&NAME_COLUMNS),
        }
    }
}

/// Per-field counters, summed across a run by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelinkStats {
    /// Distinct tokens processed.
    pub tokens: usize,
    /// Tokens carrying an extractable Drive id.
    pub drive_refs: usize,
    /// Drive references rewritten to a located asset URL (would-be rewrites in audit).
    pub rewritten: usize,
    /// Drive references that could not be fully resolved.
    pub failures: usize,
}

impl RelinkStats {
    pub fn add(&mut self, other: RelinkStats) {
        self.tokens += other.tokens;
        self.drive_refs += other.drive_refs;
        self.rewritten += other.rewritten;
        self.failures += other.failures;
    }
}

pub struct RelinkPipeline {
    resolver: Arc<dyn NameResolver>,
    finder: Arc<dyn AssetFinder>,
    sink: Arc<dyn FailureSink>,
    mode: RelinkMode,
    image_columns: Vec<String>,
}

impl RelinkPipeline {
    pub fn new(
        resolver: Arc<dyn NameResolver>,
        finder: Arc<dyn AssetFinder>,
        sink: Arc<dyn FailureSink>,
        mode: RelinkMode,
        image_columns: Vec<String>,
    ) -> Self {
        Self {
            resolver,
            finder,
            sink,
            mode,
            image_columns,
        }
    }

    pub fn mode(&self) -> RelinkMode {
        self.mode
    }

    /// Rewrite one field value (apply) or report on it (audit). Always returns
    /// a value; in audit mode it is the input, verbatim.
    pub async fn transform_field(&self, field_value: &str, ctx: &RecordContext) -> String {
        self.relink(field_value, ctx).await.0
    }

    /// Rewrite the first populated candidate image column of a record in
    /// place. Other columns are never touched.
    pub async fn transform_record(&self, record: &mut IndexMap<String, String>) -> RelinkStats {
        let ctx = RecordContext::from_record(record);
        for column in &self.image_columns {
            let Some(current) = record.get(column) else {
                continue;
            };
            if current.trim().is_empty() {
                continue;
            }
            let current = current.clone();
            let (next, stats) = self.relink(&current, &ctx).await;
            record.insert(column.clone(), next);
            return stats;
        }
        RelinkStats::default()
    }

    async fn relink(&self, field_value: &str, ctx: &RecordContext) -> (String, RelinkStats) {
        let tokens = split_references(field_value);
        let mut stats = RelinkStats::default();
        if tokens.is_empty() {
            return (field_value.to_string(), stats);
        }

        let mut out: Vec<String> = Vec::new();
        let mut emitted: HashSet<String> = HashSet::new();
        let mut processed: HashSet<String> = HashSet::new();

        for token in tokens {
            // Exact-duplicate references are suppressed across the whole
            // field; one failure row per failing reference per invocation.
            if !processed.insert(token.clone()) {
                continue;
            }
            stats.tokens += 1;

            let Some(file_id) = extract_drive_id(&token) else {
                push_unique(&mut out, &mut emitted, token);
                continue;
            };
            stats.drive_refs += 1;

            let Some(name) = self.resolver.get_filename(&file_id).await else {
                stats.failures += 1;
                self.report(ctx, &file_id, None, None, REASON_NAME_NOT_RESOLVED);
                push_unique(&mut out, &mut emitted, token);
                continue;
            };

            match self.finder.locate(&name).await {
                Some(url) => {
                    stats.rewritten += 1;
                    push_unique(&mut out, &mut emitted, url);
                }
                None => {
                    stats.failures += 1;
                    let expected = self.finder.raw_url(&name);
                    self.report(
                        ctx,
                        &file_id,
                        Some(&name),
                        Some(&expected),
                        REASON_IMAGE_NOT_FOUND,
                    );
                    push_unique(&mut out, &mut emitted, token);
                }
            }
        }

        match self.mode {
            RelinkMode::Audit => (field_value.to_string(), stats),
            RelinkMode::Apply => (out.join(","), stats),
        }
    }

    fn report(
        &self,
        ctx: &RecordContext,
        file_id: &str,
        drive_name: Option<&str>,
        expected_url: Option<&str>,
        reason: &str,
    ) {
        let reason = match self.mode {
            RelinkMode::Audit => format!("{reason} (audit)"),
            RelinkMode::Apply => reason.to_string(),
        };
        let rec = ResolutionRecord {
            date: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            sku: ctx.sku.clone(),
            product_name: ctx.product_name.clone(),
            drive_file_id: file_id.to_string(),
            drive_name: drive_name.map(str::to_string),
            expected_url: expected_url.map(str::to_string),
            reason,
        };
        if let Err(err) = self.sink.record(&rec) {
            warn!(target: "relink", file_id, %err, "failed to write resolution record");
        }
    }
}

fn push_unique(out: &mut Vec<String>, emitted: &mut HashSet<String>, value: String) {
    if emitted.insert(value.clone()) {
        out.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::strip_extension;
    use crate::report::MemorySink;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const BASE: &str = "https://cco.example.com/uploads/";

    struct StubResolver(HashMap<String, String>);

    #[async_trait]
    impl NameResolver for StubResolver {
        async fn get_filename(&self, file_id: &str) -> Option<String> {
            self.0.get(file_id).cloned()
        }
    }

    struct StubFinder {
        existing: HashSet<String>,
    }

    #[async_trait]
    impl AssetFinder for StubFinder {
        async fn locate(&self, base_name: &str) -> Option<String> {
            let stem = strip_extension(base_name);
            for ext in ["png", "jpg", "jpeg", "webp"] {
                let url = format!("{BASE}{stem}.{ext}");
                if self.existing.contains(&url) {
                    return Some(url);
                }
            }
            None
        }

        fn raw_url(&self, file_name: &str) -> String {
            format!("{BASE}{file_name}")
        }
    }

    fn pipeline(
        mode: RelinkMode,
        names: &[(&str, &str)],
        existing: &[&str],
    ) -> (RelinkPipeline, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let resolver = StubResolver(
            names
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let finder = StubFinder {
            existing: existing.iter().map(|s| s.to_string()).collect(),
        };
        let p = RelinkPipeline::new(
            Arc::new(resolver),
            Arc::new(finder),
            Arc::clone(&sink) as Arc<dyn FailureSink>,
            mode,
            vec!["Images".to_string(), "Image".to_string()],
        );
        (p, sink)
    }

    fn ctx() -> RecordContext {
        RecordContext {
            sku: "SKU-1".into(),
            product_name: "Widget".into(),
        }
    }

    const DRIVE_URL: &str = "https://drive.google.com/file/d/ABC123/view?usp=sharing";

    #[tokio::test]
    async fn test_apply_passes_through_non_cloud_tokens_deduped_in_order() {
        let (p, sink) = pipeline(RelinkMode::Apply, &[], &[]);
        let out = p.transform_field("urlA, urlB, urlA", &ctx()).await;
        assert_eq!(out, "urlA,urlB");
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_empty_field_returned_unchanged() {
        let (p, _) = pipeline(RelinkMode::Apply, &[], &[]);
        assert_eq!(p.transform_field("", &ctx()).await, "");
        assert_eq!(p.transform_field(" ,; ", &ctx()).await, " ,; ");
    }

    #[tokio::test]
    async fn test_apply_resolved_and_located_emits_exactly_one_entry() {
        let (p, sink) = pipeline(
            RelinkMode::Apply,
            &[("ABC123", "238.png")],
            &["https://cco.example.com/uploads/238.png"],
        );
        let out = p.transform_field(DRIVE_URL, &ctx()).await;
        assert_eq!(out, "https://cco.example.com/uploads/238.png");
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_apply_resolution_failure_keeps_original_and_logs() {
        let (p, sink) = pipeline(RelinkMode::Apply, &[], &[]);
        let out = p.transform_field(DRIVE_URL, &ctx()).await;
        assert_eq!(out, DRIVE_URL);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, REASON_NAME_NOT_RESOLVED);
        assert_eq!(records[0].drive_file_id, "ABC123");
        assert_eq!(records[0].sku, "SKU-1");
        assert!(records[0].drive_name.is_none());
    }

    #[tokio::test]
    async fn test_apply_not_located_keeps_original_and_records_expected_url() {
        let (p, sink) = pipeline(RelinkMode::Apply, &[("ABC123", "238.png")], &[]);
        let out = p.transform_field(DRIVE_URL, &ctx()).await;
        assert_eq!(out, DRIVE_URL);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, REASON_IMAGE_NOT_FOUND);
        assert_eq!(records[0].drive_name.as_deref(), Some("238.png"));
        assert_eq!(
            records[0].expected_url.as_deref(),
            Some("https://cco.example.com/uploads/238.png")
        );
    }

    #[tokio::test]
    async fn test_audit_never_mutates_even_when_failures_logged() {
        let (p, sink) = pipeline(RelinkMode::Audit, &[], &[]);
        let input = format!("{DRIVE_URL}, https://example.com/img.png");
        let out = p.transform_field(&input, &ctx()).await;
        assert_eq!(out, input);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, "drive_filename_not_resolved (audit)");
    }

    #[tokio::test]
    async fn test_audit_not_located_reason_is_suffixed() {
        let (p, sink) = pipeline(RelinkMode::Audit, &[("ABC123", "238.png")], &[]);
        let out = p.transform_field(DRIVE_URL, &ctx()).await;
        assert_eq!(out, DRIVE_URL);
        assert_eq!(sink.records()[0].reason, "image_not_found_on_cco (audit)");
    }

    #[tokio::test]
    async fn test_duplicate_failing_reference_logs_once() {
        let (p, sink) = pipeline(RelinkMode::Apply, &[], &[]);
        let input = format!("{DRIVE_URL},{DRIVE_URL}");
        let out = p.transform_field(&input, &ctx()).await;
        assert_eq!(out, DRIVE_URL);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_mixed_field_preserves_encounter_order() {
        let (p, _) = pipeline(
            RelinkMode::Apply,
            &[("ABC123", "238.png")],
            &["https://cco.example.com/uploads/238.png"],
        );
        let input = format!("https://example.com/a.png,{DRIVE_URL};https://example.com/z.png");
        let out = p.transform_field(&input, &ctx()).await;
        assert_eq!(
            out,
            "https://example.com/a.png,https://cco.example.com/uploads/238.png,https://example.com/z.png"
        );
    }

    #[tokio::test]
    async fn test_transform_record_rewrites_first_populated_column_only() {
        let (p, _) = pipeline(
            RelinkMode::Apply,
            &[("ABC123", "238.png")],
            &["https://cco.example.com/uploads/238.png"],
        );
        let mut record: IndexMap<String, String> = IndexMap::new();
        record.insert("SKU".into(), "SKU-9".into());
        record.insert("Name".into(), "Gadget".into());
        record.insert("Images".into(), "".into());
        record.insert("Image".into(), DRIVE_URL.into());

        let stats = p.transform_record(&mut record).await;
        // "Images" is empty, so "Image" is the first populated candidate.
        assert_eq!(record["Images"], "");
        assert_eq!(record["Image"], "https://cco.example.com/uploads/238.png");
        assert_eq!(record["SKU"], "SKU-9");
        assert_eq!(stats.drive_refs, 1);
        assert_eq!(stats.rewritten, 1);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test]
    async fn test_transform_record_without_candidate_columns_is_untouched() {
        let (p, sink) = pipeline(RelinkMode::Apply, &[], &[]);
        let mut record: IndexMap<String, String> = IndexMap::new();
        record.insert("SKU".into(), "SKU-9".into());
        let stats = p.transform_record(&mut record).await;
        assert_eq!(stats.tokens, 0);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_record_context_picks_sku_and_name_columns() {
        let mut record: IndexMap<String, String> = IndexMap::new();
        record.insert("sku".into(), " S-1 ".into());
        record.insert("post_title".into(), "Widget".into());
        let ctx = RecordContext::from_record(&record);
        assert_eq!(ctx.sku, "S-1");
        assert_eq!(ctx.product_name, "Widget");
    }
}
