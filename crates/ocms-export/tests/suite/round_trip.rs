use crate::suite::fixture::{default_settings, resolver, MemoryVfs};
use ocms_export::{
    parameter_hash, ExportSettings, PROPERTY_EXPORT, PROPERTY_EXPORT_SUFFIX, PROPERTY_LOCALE,
};
use proptest::prelude::*;
use regex::Regex;

const PROPTEST_CASES: u32 = 256;

fn file_name() -> impl Strategy<Value = String> {
    (
        "[a-z]{1,6}",
        prop_oneof![Just(""), Just(".html"), Just(".jsp"), Just(".txt")],
    )
        .prop_map(|(stem, ext)| format!("{stem}{ext}"))
}

fn export_suffix() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![Just(None), Just(Some(".html")), Just(Some(".css"))]
}

fn locale() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![Just(None), Just(Some("en")), Just(Some("fr")), Just(Some("de"))]
}

fn parameters() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z]{1,4}=[a-z0-9]{1,4}")
}

proptest! {
    #![proptest_config(ProptestConfig { cases: PROPTEST_CASES, .. ProptestConfig::default() })]

    #[test]
    fn exported_name_resolves_back_to_the_resource(
        dir in "[a-z]{1,6}",
        name in file_name(),
        suffix in export_suffix(),
        locale in locale(),
        parameters in parameters(),
        prefixing in any::<bool>(),
    ) {
        let path = format!("/sites/default/{dir}/{name}");
        // Forced, so names without an allow-listed extension are still exported.
        let mut vfs = MemoryVfs::new()
            .file(&path)
            .property(&path, PROPERTY_EXPORT, "true");
        if let Some(suffix) = suffix {
            vfs = vfs.property(&path, PROPERTY_EXPORT_SUFFIX, suffix);
        }
        if let Some(locale) = locale {
            vfs = vfs.property(&path, PROPERTY_LOCALE, locale);
        }
        let settings = ExportSettings {
            locale_prefixing: prefixing,
            locales: vec!["en".into()],
            ..default_settings()
        };
        let resolver = resolver(settings, vfs);

        let forward = resolver.exported_rfs_name(&path, parameters.as_deref()).unwrap();
        if let Some(parameters) = &parameters {
            let hash = format!("_{}", parameter_hash(parameters));
            prop_assert!(forward.rfs_path.contains(&hash), "{} lacks {}", forward.rfs_path, hash);
            let suffix = Regex::new(r"_\d+(\.[^./]*)?$").unwrap();
            prop_assert!(suffix.is_match(&forward.rfs_path));
        }

        let back = resolver.vfs_name(&forward.rfs_path).unwrap();
        prop_assert_eq!(&back.vfs_path, &path);
        prop_assert_eq!(&back.rfs_path, &forward.rfs_path);
        prop_assert_eq!(back.used_parameters, parameters);
    }
}
