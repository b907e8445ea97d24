use pmoconfig::Config;
use serde_yaml::Value;

#[test]
fn load_config_writes_defaults_to_config_dir() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(dir.path().to_str().unwrap())?;

    assert!(dir.path().join("config.yaml").exists());
    assert_eq!(config.get_log_min_level()?, "INFO");
    assert!(config.get_log_enable_console()?);
    assert_eq!(
        config.get_u64_or(&["host", "ohnet", "fetch_timeout_secs"], 0),
        10
    );

    Ok(())
}

#[test]
fn external_file_overrides_embedded_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("config.yaml"),
        "host:\n  ohnet:\n    interface: eth1\n    fetch_timeout_secs: 3\n",
    )?;

    let config = Config::load_config(dir.path().to_str().unwrap())?;

    assert_eq!(
        config.get_string(&["host", "ohnet", "interface"]).as_deref(),
        Some("eth1")
    );
    assert_eq!(config.get_u64_or(&["host", "ohnet", "fetch_timeout_secs"], 0), 3);
    // untouched defaults survive the merge
    assert_eq!(
        config.get_u64_or(&["host", "ohnet", "init", "subscription_duration_secs"], 0),
        1800
    );

    Ok(())
}

#[test]
fn set_value_is_persisted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().to_str().unwrap().to_string();

    let config = Config::load_config(&path)?;
    config.set_value(&["host", "ohnet", "interface"], Value::from("10.0.0.0"))?;

    let reloaded = Config::load_config(&path)?;
    assert_eq!(
        reloaded.get_string(&["host", "ohnet", "interface"]).as_deref(),
        Some("10.0.0.0")
    );

    Ok(())
}

#[test]
fn managed_dir_is_created_relative_to_config_dir() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(dir.path().to_str().unwrap())?;

    let managed = config.get_managed_dir(&["host", "ohnet", "proxy_dir"], "generated_proxies")?;

    assert_eq!(
        std::path::Path::new(&managed),
        dir.path().join("generated_proxies")
    );
    assert!(std::path::Path::new(&managed).is_dir());

    Ok(())
}
