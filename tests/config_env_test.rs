//! Environment overrides for the link configuration.

use anyhow::Result;
use robot_link::config::LinkConfig;
use robot_link::{RetryPolicy, SessionOptions};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

struct EnvGuard(&'static [&'static str]);

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in self.0 {
            std::env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_env_overrides_file_and_defaults() -> Result<()> {
    let _guard = EnvGuard(&["ROBOT_LINK_DEVICE__PORT", "ROBOT_LINK_SESSION__PACING"]);

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
        [device]
        host = "192.168.1.20"
        port = 9000
        "#
    )?;

    std::env::set_var("ROBOT_LINK_DEVICE__PORT", "9100");
    std::env::set_var("ROBOT_LINK_SESSION__PACING", "25ms");

    let config = LinkConfig::load_from(file.path())?;
    assert_eq!(config.device.addr(), "192.168.1.20:9100");
    assert_eq!(config.session.pacing, Duration::from_millis(25));
    config.validate()?;
    Ok(())
}

#[test]
#[serial]
fn test_env_sets_retry_bounds() -> Result<()> {
    let _guard = EnvGuard(&[
        "ROBOT_LINK_RETRY__MAX_ATTEMPTS",
        "ROBOT_LINK_RETRY__BACKOFF",
    ]);
    std::env::set_var("ROBOT_LINK_RETRY__MAX_ATTEMPTS", "7");
    std::env::set_var("ROBOT_LINK_RETRY__BACKOFF", "100ms");

    let config = LinkConfig::load()?;
    let options = SessionOptions::from(&config);
    assert_eq!(
        options.retry,
        RetryPolicy::bounded(7, Duration::from_millis(100))
    );
    assert_eq!(options.close_retry, RetryPolicy::unbounded());
    assert_eq!(options.pacing, Duration::from_millis(10));
    Ok(())
}

#[test]
#[serial]
fn test_no_env_yields_defaults() -> Result<()> {
    let config = LinkConfig::load()?;
    assert_eq!(config, LinkConfig::default());
    Ok(())
}
