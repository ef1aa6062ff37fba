//! Property-based tests using proptest
//!
//! These tests verify invariants across randomized inputs, helping catch
//! edge cases that might be missed by example-based testing.

use chrono::{TimeZone, Utc};
use devon::search::{SearchFilter, SearchFilters, parse_query};
use devon::sources::IncludeFilter;
use devon::sources::patterns::{is_safe_relative_path, validate_include_pattern};
use devon::storage::index::{Index, IndexEntry, index_key, parse_index, serialize_index};
use devon::storage::paths::is_within;
use devon::storage::resolve_model_path;
use devon::utils::{format_bytes, parse_params, parse_size};
use proptest::prelude::*;
use std::path::{Path, PathBuf};

// =============================================================================
// Strategies
// =============================================================================

/// A plain path segment such as an org or repository name
fn arb_segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9._-]{0,20}".prop_filter("not a dot segment", |s| s != "." && s != "..")
}

fn arb_model_id() -> impl Strategy<Value = String> {
    (arb_segment(), arb_segment()).prop_map(|(org, name)| format!("{org}/{name}"))
}

/// Arbitrary text including separators and traversal pieces
fn arb_hostile_id() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("..".to_string()),
            Just(".".to_string()),
            Just("/".to_string()),
            Just("\\".to_string()),
            Just("".to_string()),
            "[a-z]{1,5}",
        ],
        1..8,
    )
    .prop_map(|parts| parts.join("/"))
}

fn arb_entry() -> impl Strategy<Value = IndexEntry> {
    (
        arb_segment(),
        arb_model_id(),
        prop::collection::vec("[a-z]{1,8}\\.(json|gguf|bin)", 0..5),
        0u64..(1 << 40),
        0i64..2_000_000_000,
        prop::option::of(0i64..2_000_000_000),
    )
        .prop_map(|(source, model_id, files, size_bytes, downloaded, used)| IndexEntry {
            path: PathBuf::from("/models").join(&source).join(&model_id),
            source,
            model_id,
            metadata: Default::default(),
            files,
            downloaded_at: Utc.timestamp_opt(downloaded, 0).unwrap(),
            last_used: used.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
            size_bytes,
            unknown: Default::default(),
        })
}

// =============================================================================
// Path safety
// =============================================================================

proptest! {
    #[test]
    fn valid_ids_resolve_inside_base(source in arb_segment(), model_id in arb_model_id()) {
        let base = Path::new("/var/lib/devon/models");
        let path = resolve_model_path(base, &source, &model_id).unwrap();
        prop_assert!(is_within(base, &path));
        prop_assert!(path.ends_with(&model_id));
    }

    #[test]
    fn resolved_paths_never_escape(model_id in arb_hostile_id()) {
        let base = Path::new("/var/lib/devon/models");
        if let Ok(path) = resolve_model_path(base, "huggingface", &model_id) {
            prop_assert!(is_within(base, &path));
            prop_assert!(!model_id.split('/').any(|s| s == ".." || s == "." || s.is_empty()));
        }
    }

    #[test]
    fn safe_relative_paths_have_no_traversal(path in arb_hostile_id()) {
        if is_safe_relative_path(&path) {
            prop_assert!(!path.starts_with('/'));
            prop_assert!(!path.split('/').any(|s| s == ".."));
        }
    }

    #[test]
    fn accepted_include_patterns_compile(pattern in "[A-Za-z0-9*?._/-]{1,30}") {
        if validate_include_pattern(&pattern).is_ok() {
            let patterns = vec![pattern];
            prop_assert!(IncludeFilter::new(Some(&patterns)).is_ok());
        }
    }

    #[test]
    fn unsafe_characters_are_rejected(
        prefix in "[a-z]{0,5}",
        bad in "[;|&$`<>(){}\\[\\] \"']",
        suffix in "[a-z]{0,5}",
    ) {
        let pattern = format!("{prefix}{bad}{suffix}");
        prop_assert!(validate_include_pattern(&pattern).is_err());
    }
}

// =============================================================================
// Index
// =============================================================================

proptest! {
    #[test]
    fn index_survives_serialization(entries in prop::collection::vec(arb_entry(), 0..10)) {
        let index: Index = entries
            .into_iter()
            .map(|e| (index_key(&e.source, &e.model_id), e))
            .collect();

        let path = Path::new("index.json");
        let content = serialize_index(path, &index).unwrap();
        let parsed = parse_index(path, &content).unwrap();

        prop_assert_eq!(parsed, index);
    }

    #[test]
    fn keys_are_unique_per_model(
        a in (arb_segment(), arb_model_id()),
        b in (arb_segment(), arb_model_id()),
    ) {
        prop_assert_eq!(index_key(&a.0, &a.1) == index_key(&b.0, &b.1), a == b);
    }

    #[test]
    fn truncated_index_is_rejected(entries in prop::collection::vec(arb_entry(), 1..4), cut in 1usize..20) {
        let index: Index = entries
            .into_iter()
            .map(|e| (index_key(&e.source, &e.model_id), e))
            .collect();
        let path = Path::new("index.json");
        let content = serialize_index(path, &index).unwrap();
        let truncated = &content[..content.len().saturating_sub(cut).max(1)];

        prop_assert!(parse_index(path, truncated).is_err());
    }
}

// =============================================================================
// Sizes and queries
// =============================================================================

proptest! {
    #[test]
    fn parse_size_scales_with_unit(n in 0u64..1_000_000) {
        prop_assert_eq!(parse_size(&format!("{n}b")), Some(n));
        prop_assert_eq!(parse_size(&format!("{n}kb")), Some(n * 1024));
        prop_assert_eq!(parse_size(&format!("{n}MB")), Some(n * 1024 * 1024));
    }

    #[test]
    fn format_bytes_never_panics(bytes in any::<f64>()) {
        let formatted = format_bytes(bytes);
        prop_assert!(formatted.ends_with('B'));
    }

    #[test]
    fn parse_params_reads_billions(n in 1u64..10_000) {
        prop_assert_eq!(parse_params(&format!("{n}b")), Some(n));
        prop_assert_eq!(parse_params(&format!("{n}B")), Some(n));
    }

    #[test]
    fn query_params_token_becomes_filter(
        word in "[a-z]{3,10}".prop_filter("not a format token", |w| {
            !["gguf", "safetensors", "pytorch", "onnx"].contains(&w.as_str())
        }),
        n in 1u64..500,
    ) {
        let parsed = parse_query(&format!("{word} {n}b"));
        prop_assert_eq!(parsed.text.as_deref(), Some(word.as_str()));
        prop_assert!(parsed.filters.iter().any(|f| *f == SearchFilter::Params(n)));
    }

    #[test]
    fn later_filter_of_same_kind_wins(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let mut filters = SearchFilters::new();
        filters.push(SearchFilter::Author(a));
        filters.push(SearchFilter::Author(b.clone()));
        prop_assert_eq!(filters.len(), 1);
        prop_assert_eq!(filters.author(), Some(b.as_str()));
    }
}
