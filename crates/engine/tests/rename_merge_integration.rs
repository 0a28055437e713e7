// Rename and merge flows: moving to a free name, merging into an
// existing case, the ambiguous-merge abort, and single-section moves.

use caseclerk_engine::config::Settings;
use caseclerk_engine::error::CaseError;
use caseclerk_engine::platform::memory::{MemoryPlatform, Op};
use caseclerk_engine::rename::{move_case, move_case_section, RenameOutcome};
use caseclerk_engine::session::ProgressOutcome;
use caseclerk_engine::workflow::initialize;

const FOO: &str = "Wikipedia:Sockpuppet investigations/Foo";
const FOO_ARCHIVE: &str = "Wikipedia:Sockpuppet investigations/Foo/Archive";
const BAR: &str = "Wikipedia:Sockpuppet investigations/Bar";
const BAR_ARCHIVE: &str = "Wikipedia:Sockpuppet investigations/Bar/Archive";

fn case_text(master: &str, label: &str) -> String {
    format!(
        "<noinclude>__TOC__</noinclude>\n{{{{SPI archive notice|1={master}}}}}\n{{{{SPIpriorcases}}}}\n==={label}===\n{{{{SPI case status}}}}\nevidence about {master}\n"
    )
}

fn archive_text(master: &str) -> String {
    format!(
        "__TOC__\n{{{{SPI archive notice|1={master}}}}}\n{{{{SPIpriorcases}}}}\n===Old===\nold evidence\n"
    )
}

#[tokio::test]
async fn rename_to_free_name_moves_case_and_archive() {
    let platform = MemoryPlatform::new();
    platform.seed_page(FOO, &case_text("Foo", "19 August 2026"));
    platform.seed_page(FOO_ARCHIVE, &archive_text("Foo"));

    let mut session = initialize(&platform, Settings::default(), FOO).await.unwrap();
    let outcome = move_case(&mut session, &platform, "Bar", "wrong master", false).await.unwrap();

    assert_eq!(outcome, RenameOutcome::Moved);
    assert_eq!(session.case_name, "Bar");
    assert_eq!(session.page_title, BAR);

    // Source titles redirect; the destination notice now names Bar.
    assert!(platform.page_text(FOO).unwrap().starts_with("#REDIRECT"));
    assert!(platform.page_text(FOO_ARCHIVE).unwrap().starts_with("#REDIRECT"));
    let destination = platform.page_text(BAR).unwrap();
    assert!(destination.contains("{{SPI archive notice|1=Bar}}"));
    assert!(destination.contains("===19 August 2026==="));
    assert!(platform.page_text(BAR_ARCHIVE).unwrap().contains("===Old==="));
}

#[tokio::test]
async fn merge_into_existing_case_appends_investigations() {
    let platform = MemoryPlatform::new();
    platform.seed_page(FOO, &case_text("Foo", "19 August 2026"));
    platform.seed_page(FOO_ARCHIVE, &archive_text("Foo"));
    platform.seed_page(BAR, &case_text("Bar", "12 July 2026"));

    let mut session = initialize(&platform, Settings::default(), FOO).await.unwrap();
    let outcome = move_case(&mut session, &platform, "Bar", "same master", false).await.unwrap();

    assert_eq!(outcome, RenameOutcome::Merged);

    let destination = platform.page_text(BAR).unwrap();
    assert!(destination.contains("===12 July 2026==="));
    assert!(destination.contains("===19 August 2026==="));
    // The source scaffold does not travel; one notice remains.
    assert_eq!(destination.matches("{{SPI archive notice").count(), 1);

    assert_eq!(platform.page_text(FOO).as_deref(), Some("#REDIRECT [[Wikipedia:Sockpuppet investigations/Bar]]"));
    assert!(platform.page_text(BAR_ARCHIVE).unwrap().contains("===Old==="));
}

#[tokio::test]
async fn merge_with_two_archives_aborts_before_any_write() {
    let platform = MemoryPlatform::new();
    platform.seed_page(FOO, &case_text("Foo", "19 August 2026"));
    platform.seed_page(FOO_ARCHIVE, &archive_text("Foo"));
    platform.seed_page(BAR, &case_text("Bar", "12 July 2026"));
    platform.seed_page(BAR_ARCHIVE, &archive_text("Bar"));

    let mut session = initialize(&platform, Settings::default(), FOO).await.unwrap();
    let before = platform.page_text(BAR).unwrap();

    let err = move_case(&mut session, &platform, "Bar", "same master", false).await.unwrap_err();

    assert!(matches!(err, CaseError::AmbiguousMerge { .. }));
    assert!(platform.ops().is_empty());
    assert_eq!(platform.page_text(BAR).unwrap(), before);
    assert_eq!(session.case_name, "Foo");

    // The abort leaves an operator-visible warning behind.
    assert!(session
        .progress
        .entries()
        .iter()
        .any(|e| e.outcome == ProgressOutcome::Warned && e.what.contains(BAR)));
}

#[tokio::test]
async fn section_move_appends_to_destination_before_blanking_source() {
    let platform = MemoryPlatform::new();
    platform.seed_page(
        FOO,
        "<noinclude>__TOC__</noinclude>\n{{SPI archive notice|1=Foo}}\n{{SPIpriorcases}}\n\
         ===19 August 2026===\n{{SPI case status|close}}\nfoo evidence\n\
         ===23 August 2026===\n{{SPI case status}}\nstray evidence\n",
    );

    let settings = Settings { allow_section_moves: true, ..Settings::default() };
    let mut session = initialize(&platform, settings, FOO).await.unwrap();
    move_case_section(&mut session, &platform, 2, "Bar", "different master").await.unwrap();

    assert_eq!(
        platform.ops(),
        vec![
            Op::Edit { title: BAR.into(), section: None },
            Op::Edit { title: FOO.into(), section: Some(2) },
        ]
    );

    // The destination was created with full scaffolding.
    let destination = platform.page_text(BAR).unwrap();
    assert!(destination.starts_with(
        "<noinclude>__TOC__</noinclude>\n{{SPI archive notice|1=Bar}}\n{{SPIpriorcases}}\n"
    ));
    assert!(destination.contains("===23 August 2026===\n{{SPI case status}}\nstray evidence"));

    let source = platform.page_text(FOO).unwrap();
    assert!(source.contains("===19 August 2026==="));
    assert!(!source.contains("===23 August 2026==="));
}

#[tokio::test]
async fn section_move_requires_opt_in() {
    let platform = MemoryPlatform::new();
    platform.seed_page(FOO, &case_text("Foo", "19 August 2026"));

    let mut session = initialize(&platform, Settings::default(), FOO).await.unwrap();
    let err =
        move_case_section(&mut session, &platform, 1, "Bar", "different master").await.unwrap_err();

    assert!(matches!(err, CaseError::PermissionMismatch { .. }));
    assert!(platform.ops().is_empty());
    assert!(!platform.page_exists(BAR));
}
