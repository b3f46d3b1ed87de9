use std::io::Write;
use std::path::Path;

use tfel_behaviour::loader::{library_candidates, parse_key_file, DEFAULT_KEY_FILE};
use tfel_behaviour::{LoaderError, LoaderRegistry};

fn key_file(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(".k")
        .tempfile()
        .unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn single_association_is_parsed() {
    let content = "# materials\n\n41 mylib myfunc\n";
    let entries = parse_key_file(Path::new(DEFAULT_KEY_FILE), content).unwrap();
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!((e.id, e.library.as_str(), e.function.as_str()), (41, "mylib", "myfunc"));
}

#[test]
fn missing_library_reports_every_candidate() {
    let f = key_file("41 tfel_behaviour_missing_library myfunc\n");
    match LoaderRegistry::from_key_file(f.path()) {
        Err(LoaderError::LibraryNotFound { library, attempts }) => {
            assert_eq!(library, "tfel_behaviour_missing_library");
            assert_eq!(attempts, library_candidates("tfel_behaviour_missing_library"));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn a_second_association_is_rejected_before_loading() {
    let f = key_file("41 mylib f\n42 mylib g\n41 otherlib h\n");
    assert!(matches!(
        LoaderRegistry::from_key_file(f.path()),
        Err(LoaderError::AlreadyAssociated(41))
    ));
}

#[test]
fn identifiers_outside_the_user_material_range_are_rejected() {
    let f = key_file("12 mylib f\n");
    assert!(matches!(
        LoaderRegistry::from_key_file(f.path()),
        Err(LoaderError::InvalidIdentifier { line: 1, .. })
    ));
}

#[test]
fn empty_registry_has_no_behaviour() {
    let f = key_file("# nothing yet\n");
    let registry = LoaderRegistry::from_key_file(f.path()).unwrap();
    assert_eq!(registry.identifiers().count(), 0);
    assert!(matches!(
        registry.function(41, "brick"),
        Err(LoaderError::NoBehaviour(41))
    ));
}
