use std::fs;

use anyhow::Result;
use closet::BaseDepth;
use closet::FailurePolicy;
use closet::FilterContext;
use closet::FilterManager;
use closet::FilterResult;
use closet::Separators;
use closet::Settings;
use closet::TagData;
use closet::Template;
use tempfile::tempdir;

#[test]
fn test_render_with_project_settings() -> Result<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("closet.toml"),
        r#"
on_failure = "passthrough"

[delimiters]
open = "{{"
close = "}}"
sep = "|"
sub_sep = ","
"#,
    )?;

    let settings = Settings::new(dir.path())?;
    assert_eq!(settings.on_failure, FailurePolicy::Passthrough);

    let mut manager = FilterManager::from_settings(&settings);
    manager.register(
        "join",
        |tag: &TagData, _: &mut FilterContext<'_>| Ok(FilterResult::ready(tag.joined(0, "+"))),
        Separators::Template,
    );

    let template = Template::with_settings(
        vec!["{{join|a,b}} {{unknown}}".to_string()],
        BaseDepth::Single,
        &settings,
    )?;
    let rendered = template.render(&mut manager)?;

    insta::assert_debug_snapshot!(rendered, @r#"
    Rendered {
        fragments: [
            "a+b {{unknown}}",
        ],
        ready: true,
        iterations: 1,
    }
    "#);
    Ok(())
}

#[test]
fn test_invalid_delimiters_in_settings() -> Result<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("closet.toml"),
        "[delimiters]\nopen = \"::\"\n",
    )?;

    let settings = Settings::new(dir.path())?;
    let result = Template::with_settings(vec![String::new()], BaseDepth::Single, &settings);
    assert!(result.is_err());
    Ok(())
}
