//! Integration tests for a workspace configured through `.bitbake-ls.yml`.

use std::fs;

use tempfile::TempDir;
use tower_lsp::lsp_types::{Position, Url};

use bitbake_ls::handlers;
use bitbake_ls::{Analyzer, Config};

fn workspace() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("meta-custom/classes")).unwrap();
    fs::create_dir_all(root.join("meta-custom/conf")).unwrap();
    fs::create_dir_all(root.join("build")).unwrap();
    fs::write(root.join("meta-custom/classes/widget.bbclass"), "WIDGET = \"1\"\n").unwrap();
    fs::write(
        root.join("meta-custom/conf/layer.conf"),
        "BBFILE_COLLECTIONS += \"custom\"\nBBFILE_PRIORITY_custom = \"6\"\n",
    )
    .unwrap();
    fs::write(
        root.join("build/env.txt"),
        "# $MACHINE [1 operations]\n#   set /poky/build/conf/local.conf:12\n#     \"qemux86-64\"\nMACHINE=\"qemux86-64\"\n",
    )
    .unwrap();
    fs::write(
        root.join(".bitbake-ls.yml"),
        "debounce_ms: 50\nembedded: false\nlayer_roots:\n  - meta-custom\ntrace_file: build/env.txt\n",
    )
    .unwrap();
    temp_dir
}

#[test]
fn test_config_paths_resolve_against_root() {
    let temp_dir = workspace();
    let config = Config::load(temp_dir.path()).expect("load config");
    assert_eq!(config.debounce_ms, 50);
    assert!(!config.embedded);
    assert_eq!(config.layer_roots, vec![temp_dir.path().join("meta-custom")]);
    assert_eq!(config.trace_file, Some(temp_dir.path().join("build/env.txt")));
}

#[test]
fn test_initialization_options_override_file() {
    let temp_dir = workspace();
    let mut config = Config::load(temp_dir.path()).unwrap();
    config
        .merge_json(&serde_json::json!({ "debounceMs": 10, "embedded": true }))
        .unwrap();
    assert_eq!(config.debounce_ms, 10);
    assert!(config.embedded);
    assert_eq!(config.layer_roots, vec![temp_dir.path().join("meta-custom")]);
}

#[test]
fn test_configured_workspace_serves_classes_and_trace_values() {
    let temp_dir = workspace();
    let config = Config::load(temp_dir.path()).unwrap();
    let trace_file = config.trace_file.clone().unwrap();

    let analyzer = Analyzer::default();
    analyzer.configure(config, Some(temp_dir.path().to_path_buf()));
    analyzer.refresh_inventory().unwrap();
    analyzer.load_trace(&trace_file).unwrap();

    let uri = Url::from_file_path(temp_dir.path().join("meta-custom/recipes/foo.bb")).unwrap();
    analyzer.analyze(&uri, Some(1), "inherit \nA = \"${MACHINE}\"\n");

    let labels: Vec<String> = handlers::completion(&analyzer, &uri, Position::new(0, 8))
        .into_iter()
        .map(|item| item.label)
        .collect();
    assert_eq!(labels, vec!["widget".to_string()]);

    let hover = handlers::hover(&analyzer, &uri, Position::new(1, 8)).expect("hover on MACHINE");
    let tower_lsp::lsp_types::HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markdown hover");
    };
    assert!(markup.value.contains("qemux86-64"));
}
