use std::path::Path;

use monitor_engine::analyze::AnalysisMode;
use monitor_engine::config::{self, BotKind, SourceConfig};
use monitor_engine::fetch::Recency;

#[test]
fn shipped_bots_file_is_valid() {
    let cfg = config::load_from(Path::new("config/bots.toml")).unwrap();
    assert_eq!(
        cfg.bot_names(),
        ["author-books", "samsung-dart", "biosimilar-digest", "eth-dip"]
    );

    let BotKind::Informational(digest) = &cfg.bot("biosimilar-digest").unwrap().kind else {
        panic!("expected informational");
    };
    assert_eq!(digest.mode, AnalysisMode::Digest);
    assert_eq!(digest.recency, Recency::Week);

    let BotKind::Informational(dart) = &cfg.bot("samsung-dart").unwrap().kind else {
        panic!("expected informational");
    };
    assert!(matches!(dart.source, SourceConfig::Dart { .. }));
    let extract = dart.extract.as_ref().expect("samsung-dart extracts results");
    assert_eq!(
        extract.dataset_path(Path::new("data/samsung-dart")),
        Path::new("data/samsung-dart/results.json")
    );

    let BotKind::Transactional(eth) = &cfg.bot("eth-dip").unwrap().kind else {
        panic!("expected transactional");
    };
    let ladder = eth.ladder().unwrap();
    assert_eq!(ladder.select(-3.0).unwrap().amount, 110_000.0);
    assert_eq!(ladder.select(-11.0).unwrap().amount, 500_000.0);
    assert!(ladder.select(-1.0).is_none());
}
