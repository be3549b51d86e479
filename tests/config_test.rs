use routepool::pool::Route;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
pool:
  max_total_connections: 64
  max_connections_per_route: 8
  route_overrides:
    "https://api.example.com": 16

timeouts:
  connect_timeout_ms: 1500
  acquire_timeout_ms: 750
  transfer_timeout_ms: 20000

retry:
  max_retry_attempts: 4
  backoff_ms: 50

evictor:
  enabled: true
  idle_threshold_secs: 45
  sweep_interval_secs: 5
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = routepool::config::load_config(config_path.to_str()).unwrap();

    assert_eq!(config.pool.max_total_connections, 64);
    assert_eq!(config.pool.max_connections_per_route, 8);

    let limits = config.pool_limits().unwrap();
    assert_eq!(limits.max_for(&Route::new("https", "api.example.com", 443)), 16);
    assert_eq!(limits.max_for(&Route::new("https", "www.example.com", 443)), 8);

    let request = config.request_config();
    assert_eq!(request.max_attempts, 4);
    assert_eq!(request.connect_timeout, Duration::from_millis(1500));
    assert_eq!(request.acquire_timeout, Duration::from_millis(750));
    assert_eq!(request.transfer_timeout, Duration::from_secs(20));

    assert_eq!(config.retry_policy().delay_for(2), Duration::from_millis(100));

    let evictor = config.evictor_config();
    assert_eq!(evictor.idle_threshold, Duration::from_secs(45));
    assert_eq!(evictor.sweep_interval, Duration::from_secs(5));
}

/// Test loading configuration from environment variables
#[test]
fn test_load_env_config() {
    let vars = [
        ("ROUTEPOOL_MAX_TOTAL", "12"),
        ("ROUTEPOOL_MAX_PER_ROUTE", "3"),
        ("ROUTEPOOL_CONNECT_TIMEOUT_MS", "250"),
        ("ROUTEPOOL_MAX_RETRY_ATTEMPTS", "2"),
        ("ROUTEPOOL_SWEEP_INTERVAL_SECS", "not-a-number"),
    ];
    let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let config = routepool::config::load_from_env().unwrap();

    assert_eq!(config.pool.max_total_connections, 12);
    assert_eq!(config.pool.max_connections_per_route, 3);
    assert_eq!(config.timeouts.connect_timeout_ms, 250);
    assert_eq!(config.retry.max_retry_attempts, 2);
    // Unparsable values fall back to the default
    assert_eq!(config.evictor.sweep_interval_secs, 3);
    assert_eq!(config.timeouts.acquire_timeout_ms, 500);

    for (key, orig) in originals {
        cleanup_env(key, orig);
    }
}

/// Test default values
#[test]
fn test_default_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "evictor:\n  enabled: false\n").unwrap();

    let config = routepool::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.pool.max_total_connections, 200);
    assert_eq!(config.pool.max_connections_per_route, 20);
    assert!(config.pool.route_overrides.is_empty());
    assert_eq!(config.timeouts.connect_timeout_ms, 1000);
    assert_eq!(config.timeouts.acquire_timeout_ms, 500);
    assert_eq!(config.timeouts.transfer_timeout_ms, 10_000);
    assert_eq!(config.retry.max_retry_attempts, 5);
    assert_eq!(config.retry.backoff_ms, 0);
    assert!(!config.evictor.enabled);
    assert_eq!(config.evictor.idle_threshold_secs, 30);
    assert_eq!(config.evictor.sweep_interval_secs, 3);
}

/// Test that invalid files are rejected
#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let zero_interval = temp_dir.path().join("zero.yaml");
    fs::write(&zero_interval, "evictor:\n  sweep_interval_secs: 0\n").unwrap();
    assert!(routepool::config::load_config(zero_interval.to_str()).is_err());

    let malformed = temp_dir.path().join("malformed.yaml");
    fs::write(&malformed, "pool: [unclosed\n").unwrap();
    assert!(routepool::config::load_from_yaml(&malformed).is_err());

    let missing = temp_dir.path().join("missing.yaml");
    assert!(routepool::config::load_from_yaml(&missing).is_err());
}

/// Helper function to cleanup environment variables
fn cleanup_env(key: &str, orig_val: Option<String>) {
    match orig_val {
        Some(val) => env::set_var(key, val),
        None => env::remove_var(key),
    }
}
