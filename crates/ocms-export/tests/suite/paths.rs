use ocms_export::{to_absolute, to_relative};
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 256;

fn segments() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z0-9]{1,4}", 0..5)
}

fn absolute(dirs: &[String], file: &str) -> String {
    let mut path = String::from("/");
    for dir in dirs {
        path.push_str(dir);
        path.push('/');
    }
    path.push_str(file);
    path
}

proptest! {
    #![proptest_config(ProptestConfig { cases: PROPTEST_CASES, .. ProptestConfig::default() })]

    #[test]
    fn relative_link_resolves_back_to_target(
        from_dirs in segments(),
        to_dirs in segments(),
        from_file in "[a-z]{1,4}\\.html",
        to_file in "[a-z]{1,4}\\.html",
    ) {
        let from = absolute(&from_dirs, &from_file);
        let to = absolute(&to_dirs, &to_file);
        let relative = to_relative(&from, &to);
        prop_assert!(!relative.starts_with('/'));
        prop_assert_eq!(to_absolute(&relative, &from), to);
    }

    #[test]
    fn relative_link_to_folder_resolves_back(
        from_dirs in segments(),
        to_dirs in segments(),
        from_file in "[a-z]{1,4}\\.html",
    ) {
        let from = absolute(&from_dirs, &from_file);
        let to = absolute(&to_dirs, "");
        let relative = to_relative(&from, &to);
        prop_assert!(!relative.is_empty());
        prop_assert_eq!(to_absolute(&relative, &from), to);
    }

    #[test]
    fn absolute_output_never_contains_dot_segments(
        parts in proptest::collection::vec(prop_oneof!["\\.", "\\.\\.", "[a-z]{1,3}"], 1..8),
        base_dirs in segments(),
    ) {
        let uri = parts.join("/");
        let resolved = to_absolute(&uri, &absolute(&base_dirs, "index.html"));
        prop_assert!(resolved.starts_with('/'));
        prop_assert!(!resolved.split('/').any(|segment| segment == "." || segment == ".."));
    }
}
