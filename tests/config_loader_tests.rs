use alerting_upgrade::config::{ConfigLoader, RouteStrategy};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const TEST_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("UALERT_PROFILE");
        env::remove_var("UALERT_DATABASE_URL");
        env::remove_var("UALERT_DATA_PATH");
        env::remove_var("UALERT_LOG_LEVEL");
        env::remove_var("UALERT_SECRET_KEY");
        env::remove_var("UALERT_UPGRADE_BACKUP_ACKNOWLEDGED");
        env::remove_var("UALERT_UPGRADE_ROUTE_STRATEGY");
        env::remove_var("UALERT_UPGRADE_PROMOTE_FIRST_CHANNEL_AS_DEFAULT");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("UALERT_SECRET_KEY", TEST_KEY);
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.database_url, "sqlite://alerting.db?mode=rwc");
    assert_eq!(cfg.silences_path(), PathBuf::from("data/alerting/silences"));
    assert!(!cfg.upgrade.backup_acknowledged);
    assert_eq!(cfg.upgrade.route_strategy, RouteStrategy::Bundled);
    assert!(cfg.upgrade.promote_first_channel_as_default);
    assert_eq!(cfg.secret_key.as_deref().map(<[u8]>::len), Some(32));
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "UALERT_DATA_PATH=/var/lib/one\n");
    write_env_file(&temp_dir, ".env.test", "UALERT_DATA_PATH=/var/lib/two\n");
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "UALERT_DATA_PATH=/var/lib/three\nUALERT_UPGRADE_ROUTE_STRATEGY=fan_out\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!("UALERT_PROFILE=test\nUALERT_DATA_PATH=/var/lib/local\nUALERT_SECRET_KEY={TEST_KEY}\n"),
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.data_path, PathBuf::from("/var/lib/three"));
    assert_eq!(cfg.upgrade.route_strategy, RouteStrategy::FanOut);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("UALERT_UPGRADE_BACKUP_ACKNOWLEDGED=false\nUALERT_SECRET_KEY={TEST_KEY}\n"),
    );

    unsafe {
        env::set_var("UALERT_UPGRADE_BACKUP_ACKNOWLEDGED", "yes");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert!(cfg.upgrade.backup_acknowledged);

    clear_env();
}

#[test]
fn missing_secret_key_returns_error_once_acknowledged() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("unacknowledged config loads without a key");
    assert!(cfg.secret_key.is_none());
    assert!(!cfg.upgrade.backup_acknowledged);

    unsafe {
        env::set_var("UALERT_UPGRADE_BACKUP_ACKNOWLEDGED", "true");
    }
    let err = loader.load().expect_err("missing key should fail");
    assert!(format!("{}", err).contains("UALERT_SECRET_KEY"));

    clear_env();
}

#[test]
fn invalid_values_return_errors() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("UALERT_SECRET_KEY", TEST_KEY);
        env::set_var("UALERT_UPGRADE_ROUTE_STRATEGY", "sideways");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("unknown strategy should fail");
    assert!(format!("{}", err).contains("sideways"));

    unsafe {
        env::remove_var("UALERT_UPGRADE_ROUTE_STRATEGY");
        env::set_var("UALERT_UPGRADE_BACKUP_ACKNOWLEDGED", "perhaps");
    }
    let err = loader.load().expect_err("non-boolean flag should fail");
    assert!(format!("{}", err).contains("perhaps"));

    unsafe {
        env::remove_var("UALERT_UPGRADE_BACKUP_ACKNOWLEDGED");
        env::set_var("UALERT_SECRET_KEY", "c2hvcnQ=");
    }
    let err = loader.load().expect_err("short key should fail");
    assert!(format!("{}", err).contains("32 bytes"));

    clear_env();
}
