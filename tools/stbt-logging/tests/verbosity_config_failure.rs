use stbt_logging::errors::StbtError;
use stbt_logging::image_logger::{ImageLogger, MetadataValue};
use stbt_logging::verbosity::{debug, debug_level, with_debug_level};

#[test]
fn unresolvable_level_is_fatal_unless_overridden() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::env::set_var(
        "STBT_CONFIG_FILE",
        dir.path().join("does-not-exist.toml"),
    );

    assert!(matches!(debug_level(), Err(StbtError::Io(_))));
    assert!(debug("unreachable").is_err());
    assert!(ImageLogger::new("match", Vec::<(String, MetadataValue)>::new()).is_err());

    with_debug_level(1, || {
        assert_eq!(debug_level().expect("override"), 1);
        debug("override needs no config").expect("debug");
    });
}
