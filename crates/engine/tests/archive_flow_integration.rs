// Archive flow against the in-memory platform: closed sections move to
// the archive, full archives rotate first, and passes without closed
// sections change nothing.

use caseclerk_engine::archive::archive_case;
use caseclerk_engine::config::Settings;
use caseclerk_engine::platform::memory::{MemoryPlatform, Op};
use caseclerk_engine::workflow::{initialize, one_click_archive, ArchiveRun};

const CASE: &str = "Wikipedia:Sockpuppet investigations/Foo";
const ARCHIVE: &str = "Wikipedia:Sockpuppet investigations/Foo/Archive";

fn scaffold() -> String {
    "<noinclude>__TOC__</noinclude>\n{{SPI archive notice|1=Foo}}\n{{SPIpriorcases}}\n"
        .to_string()
}

fn investigation(label: &str, status: &str) -> String {
    format!("==={label}===\n{{{{SPI case status|{status}}}}}\nevidence about {label}\n")
}

#[tokio::test]
async fn closed_section_moves_to_the_archive() {
    let platform = MemoryPlatform::new();
    let text = format!(
        "{}{}{}",
        scaffold(),
        investigation("19 August 2026", "close"),
        investigation("28 August 2026", "open"),
    );
    platform.seed_page(CASE, &text);

    let mut session = initialize(&platform, Settings::default(), CASE).await.unwrap();
    let outcome = archive_case(&mut session, &platform).await.unwrap();

    assert_eq!(outcome.archived, 1);
    assert!(!outcome.rotated);

    let archive = platform.page_text(ARCHIVE).unwrap();
    assert!(archive.starts_with("__TOC__\n{{SPI archive notice|1=Foo}}\n{{SPIpriorcases}}\n"));
    assert!(archive.contains("===19 August 2026===\nevidence about 19 August 2026"));
    // The status tag stays behind; archived sections carry none.
    assert!(!archive.contains("{{SPI case status"));

    let case = platform.page_text(CASE).unwrap();
    assert!(!case.contains("===19 August 2026==="));
    assert!(case.contains("===28 August 2026==="));
}

#[tokio::test]
async fn pass_without_closed_sections_changes_nothing() {
    let platform = MemoryPlatform::new();
    let text = format!("{}{}", scaffold(), investigation("28 August 2026", "open"));
    platform.seed_page(CASE, &text);
    let before = platform.revision(CASE);

    let mut session = initialize(&platform, Settings::default(), CASE).await.unwrap();
    let outcome = archive_case(&mut session, &platform).await.unwrap();

    assert_eq!(outcome.archived, 0);
    assert!(platform.ops().is_empty());
    assert_eq!(platform.revision(CASE), before);
    assert!(!platform.page_exists(ARCHIVE));
}

#[tokio::test]
async fn full_archive_rotates_to_a_numbered_slot_first() {
    let platform = MemoryPlatform::new();
    let text = format!("{}{}", scaffold(), investigation("19 August 2026", "close"));
    platform.seed_page(CASE, &text);
    platform.seed_page(
        ARCHIVE,
        "__TOC__\n{{SPI archive notice|1=Foo}}\n{{SPIpriorcases}}\n===Old===\nold evidence\n",
    );
    platform.set_render_limit(10);

    let mut session = initialize(&platform, Settings::default(), CASE).await.unwrap();
    let outcome = archive_case(&mut session, &platform).await.unwrap();

    assert_eq!(outcome.archived, 1);
    assert!(outcome.rotated);

    // Rotation happens before the archive append, which happens before
    // the source section is blanked.
    assert_eq!(
        platform.ops(),
        vec![
            Op::Move { from: ARCHIVE.into(), to: format!("{ARCHIVE}/1") },
            Op::Edit { title: ARCHIVE.into(), section: None },
            Op::Edit { title: CASE.into(), section: Some(1) },
        ]
    );
    assert!(platform.page_text(&format!("{ARCHIVE}/1")).unwrap().contains("===Old==="));
    assert!(platform.page_text(ARCHIVE).unwrap().contains("===19 August 2026==="));
}

#[tokio::test]
async fn one_click_archive_reports_pages_with_nothing_left() {
    let platform = MemoryPlatform::new();
    platform.seed_page(CASE, &scaffold());

    let mut session = initialize(&platform, Settings::default(), CASE).await.unwrap();
    let run = one_click_archive(&mut session, &platform).await.unwrap();

    assert_eq!(run, ArchiveRun::AlreadyArchived);
    assert!(platform.ops().is_empty());
}

#[tokio::test]
async fn one_click_archive_purges_after_archiving() {
    let platform = MemoryPlatform::new();
    let text = format!("{}{}", scaffold(), investigation("19 August 2026", "close"));
    platform.seed_page(CASE, &text);

    let mut session = initialize(&platform, Settings::default(), CASE).await.unwrap();
    let run = one_click_archive(&mut session, &platform).await.unwrap();

    match run {
        ArchiveRun::Archived(outcome) => assert_eq!(outcome.archived, 1),
        other => panic!("expected an archive pass, got {other:?}"),
    }
    assert!(platform.ops().contains(&Op::Purge { title: CASE.into() }));
}
