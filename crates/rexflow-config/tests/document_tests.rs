use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rexflow_config::{Block, BlockKind, Document, Entry, Field, TitleMode, SUMMARY_PLOT_REGIONS};

const THREE_REGIONS: &str = r#"Job: "tW"
  Label: "tW"
  SummaryPlotRegions: reg1j1b,reg2j1b,reg2j2b
  ReadFrom: NTUP

Region: "reg1j1b"
  Type: SIGNAL

Region: "reg2j1b"
  Type: CONTROL

Region: "reg2j2b"
  Type: CONTROL

Systematic: "ttbar_PS_1j1b"
  Samples: ttbar
  Regions: reg1j1b

Systematic: "ttbar_PS_2j2b"
  Samples: ttbar
  Regions: reg2j2b
"#;

#[test]
fn drop_region_scenario() {
    let doc = Document::parse(THREE_REGIONS).unwrap();
    let dropped = doc.drop_region("reg1j1b");

    assert_eq!(dropped.blocks_of(BlockKind::Region).count(), 2);
    assert_eq!(
        dropped.titles(BlockKind::Systematic, TitleMode::All),
        vec!["ttbar_PS_2j2b"]
    );
    assert_eq!(dropped.job().field(SUMMARY_PLOT_REGIONS), Some("reg2j1b,reg2j2b"));
    assert_eq!(dropped.job().field("ReadFrom"), Some("NTUP"));
}

#[test]
fn drop_region_by_fragment_keeps_summary_in_sync() {
    let doc = Document::parse(THREE_REGIONS).unwrap();
    let dropped = doc.drop_region("2j2b");

    assert_eq!(
        dropped.titles(BlockKind::Region, TitleMode::All),
        vec!["reg1j1b", "reg2j1b"]
    );
    assert_eq!(dropped.job().field(SUMMARY_PLOT_REGIONS), Some("reg1j1b,reg2j1b"));
}

#[test]
fn dropping_every_region_removes_summary_field() {
    let doc = Document::parse(THREE_REGIONS).unwrap();
    let dropped = doc.drop_region("reg1j1b").drop_region("reg2j1b").drop_region("reg2j2b");

    assert!(dropped.titles_of(BlockKind::Region).is_empty());
    assert_eq!(dropped.job().field(SUMMARY_PLOT_REGIONS), None);
}

#[test]
fn render_round_trips_text() {
    let doc = Document::parse(THREE_REGIONS).unwrap();
    assert_eq!(doc.render(), THREE_REGIONS);
}

#[test]
fn read_and_write_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fit.conf");
    std::fs::write(&path, THREE_REGIONS).unwrap();

    let doc = Document::read(&path).unwrap();
    doc.drop_systematics(&["ttbar_PS_1j1b"]).write(&path).unwrap();

    let reread = Document::read(&path).unwrap();
    assert_eq!(reread.titles(BlockKind::Systematic, TitleMode::All), vec!["ttbar_PS_2j2b"]);
    assert!(Document::read(dir.path().join("missing.conf")).is_err());
}

#[test]
fn comments_survive_round_trip() {
    let text = "% generated for tW\nJob: \"tW\"\n  # nominal only\n  ReadFrom: NTUP\n\n\
// control\nRegion: \"reg1j1b\"\n  Type: CONTROL\n";
    let doc = Document::parse(text).unwrap();
    assert_eq!(doc.render(), text);

    let built = Document::with_job(
        Block::new(BlockKind::Job, "tW")
            .with_leading_comment("% generated for tW")
            .with_comment("  # nominal only")
            .with_field(Field::new("ReadFrom", "NTUP")),
    );
    assert_eq!(built.blocks()[0], doc.blocks()[0]);
}

fn arb_field() -> impl Strategy<Value = Field> {
    ("[A-Z][A-Za-z]{0,8}", "[A-Za-z0-9_.,]{0,10}", any::<bool>())
        .prop_map(|(key, value, quoted)| Field { key, value, quoted })
}

fn arb_comment() -> impl Strategy<Value = String> {
    "( {0,2})(%|#|//)[A-Za-z0-9_ :]{0,12}"
}

fn arb_entry() -> impl Strategy<Value = Entry> {
    prop_oneof![
        3 => arb_field().prop_map(Entry::Field),
        1 => arb_comment().prop_map(Entry::Comment),
    ]
}

fn arb_block(kind: BlockKind) -> impl Strategy<Value = Block> {
    (
        proptest::collection::vec(arb_comment(), 0..2),
        "[a-z][A-Za-z0-9_]{0,8}",
        proptest::collection::vec(arb_entry(), 0..5),
    )
        .prop_map(move |(leading, title, entries)| {
            let block = leading
                .into_iter()
                .fold(Block::new(kind, title), Block::with_leading_comment);
            entries.into_iter().fold(block, |block, entry| match entry {
                Entry::Field(field) => block.with_field(field),
                Entry::Comment(line) => block.with_comment(line),
            })
        })
}

fn arb_kind() -> impl Strategy<Value = BlockKind> {
    prop_oneof![
        Just(BlockKind::Fit),
        Just(BlockKind::Region),
        Just(BlockKind::Sample),
        Just(BlockKind::Systematic),
        Just(BlockKind::NormFactor),
    ]
}

fn arb_document() -> impl Strategy<Value = Document> {
    let body = proptest::collection::vec(arb_kind().prop_flat_map(arb_block), 0..12);
    (arb_block(BlockKind::Job), body).prop_map(|(job, blocks)| {
        let mut doc = Document::with_job(job);
        for block in blocks {
            doc.push(block).unwrap();
        }
        doc
    })
}

fn arb_region_document() -> impl Strategy<Value = (Document, String)> {
    let names = proptest::sample::subsequence(
        vec!["reg1j1b", "reg2j1b", "reg2j2b", "reg3j", "VRpt"],
        1..=5,
    );
    (names, any::<proptest::sample::Index>()).prop_map(|(names, pick)| {
        let job = Block::new(BlockKind::Job, "tW")
            .with_field(Field::new(SUMMARY_PLOT_REGIONS, names.join(",")));
        let mut doc = Document::with_job(job);
        for name in &names {
            doc.push(Block::new(BlockKind::Region, *name)).unwrap();
            doc.push(
                Block::new(BlockKind::Systematic, format!("sys_{name}"))
                    .with_field(Field::new("Regions", *name)),
            )
            .unwrap();
        }
        let target = pick.get(&names).to_string();
        (doc, target)
    })
}

proptest! {
    #[test]
    fn prop_parse_render_round_trip(doc in arb_document()) {
        let reparsed = Document::parse(&doc.render()).unwrap();
        prop_assert_eq!(reparsed, doc);
    }

    #[test]
    fn prop_region_removal_is_complete((doc, region) in arb_region_document()) {
        let dropped = doc.drop_region(&region);
        prop_assert!(!dropped.titles_of(BlockKind::Region).contains(&region));
        prop_assert!(!dropped.job().list_field(SUMMARY_PLOT_REGIONS).contains(&region));
        prop_assert!(dropped
            .blocks_of(BlockKind::Systematic)
            .all(|b| !b.mentions(&region)));
    }

    #[test]
    fn prop_drop_systematics_is_idempotent(
        doc in arb_document(),
        titles in proptest::collection::vec("[a-z][A-Za-z0-9_]{0,8}", 0..4),
    ) {
        let once = doc.drop_systematics(&titles);
        let twice = once.drop_systematics(&titles);
        prop_assert_eq!(once, twice);
    }
}
