//! Fixture tests
//!
//! Every directory in /tests/cases/ holds terraform files, a `*.mptf.hcl` configuration and the files expected after
//! the transform in `expected/`. Expected files are compared structurally, comments and whitespace do not matter.
use pretty_assertions::assert_eq;
use std::path::Path;

fn copy_terraform_files(from: &Path, to: &Path) {
    for entry in std::fs::read_dir(from).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|extension| extension == "tf") {
            std::fs::copy(&path, to.join(path.file_name().unwrap())).unwrap();
        }
    }
}

fn parse(path: &Path) -> hcl::Body {
    let content = std::fs::read_to_string(path).unwrap();
    hcl::from_str(&content).unwrap_or_else(|err| panic!("{} must parse: {err}", path.display()))
}

#[test]
fn cases() {
    insta::glob!("cases/*/main.mptf.hcl", |path| {
        let case = path.parent().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        copy_terraform_files(case, workspace.path());

        mapotf::runner::transform(workspace.path(), case, false).unwrap();

        for entry in std::fs::read_dir(case.join("expected")).unwrap() {
            let expected = entry.unwrap().path();
            let actual = workspace.path().join(expected.file_name().unwrap());

            assert_eq!(parse(&actual), parse(&expected), "{}", actual.display());

            let written = std::fs::read_to_string(&actual).unwrap();
            assert_eq!(mapotf::format::format(&written), written, "output must be normalized");
        }
    });
}
