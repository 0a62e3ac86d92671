use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.upstream.url.is_none());
    assert_eq!(settings.upstream.connect_timeout, Duration::from_secs(10));
    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:55052");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.cache.data_dir, PathBuf::from("/tmp/treegen-proxy"));
    assert_eq!(settings.cache.retain, 7000);
    assert_eq!(settings.cache.warm_capacity.get(), 256);
    assert_eq!(settings.cache.read_ahead, 32);
    assert_eq!(settings.jobs.warm_interval, Duration::from_secs(180));
    assert_eq!(settings.jobs.prune_interval, Duration::from_secs(3600));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.addr = Some("0.0.0.0:4000".to_string());
    raw.cache.retain = Some(10);
    raw.logging.level = Some("warn".to_string());

    let overrides = ServeOverrides {
        addr: Some("127.0.0.1:4321".to_string()),
        retain: Some(0),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.cache.retain, 0);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn debug_flag_wins_over_level() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("error".to_string());

    raw.apply_serve_overrides(&ServeOverrides {
        debug: true,
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn upstream_url_is_validated() {
    let mut raw = RawSettings::default();
    raw.upstream.url = Some("http://127.0.0.1:5052".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.upstream.url.map(|url| url.to_string()).as_deref(),
        Some("http://127.0.0.1:5052/")
    );

    let mut raw = RawSettings::default();
    raw.upstream.url = Some("ftp://node".to_string());
    let err = Settings::from_raw(raw).expect_err("unsupported scheme");
    assert!(matches!(err, LoadError::Invalid { key: "upstream.url", .. }));

    let mut raw = RawSettings::default();
    raw.upstream.url = Some("not a url".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn blank_upstream_url_is_unset() {
    let mut raw = RawSettings::default();
    raw.upstream.url = Some("  ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.upstream.url.is_none());
}

#[test]
fn zero_intervals_are_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.warm_interval_seconds = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero interval");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.warm_interval_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.warm_capacity = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.warm_capacity",
            ..
        }
    ));
}

#[test]
fn invalid_addr_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.addr = Some("nowhere".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid addr");
    assert!(matches!(err, LoadError::Invalid { key: "server.addr", .. }));
}

#[test]
fn cache_config_follows_settings() {
    let mut raw = RawSettings::default();
    raw.cache.data_dir = Some(PathBuf::from("/var/lib/proxy"));
    raw.cache.warm_capacity = Some(8);
    raw.cache.read_ahead = Some(4);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let config = settings.cache_config();
    assert_eq!(config.data_dir, PathBuf::from("/var/lib/proxy"));
    assert_eq!(config.warm_capacity, 8);
    assert_eq!(config.read_ahead, 4);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["beacon-cache-proxy"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "beacon-cache-proxy",
        "serve",
        "--bn-url",
        "http://localhost:5052",
        "--data-dir",
        "/srv/cache",
        "--retain",
        "100",
        "--debug",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(
                serve.overrides.bn_url.as_deref(),
                Some("http://localhost:5052")
            );
            assert_eq!(
                serve.overrides.data_dir.as_deref(),
                Some(std::path::Path::new("/srv/cache"))
            );
            assert_eq!(serve.overrides.retain, Some(100));
            assert!(serve.overrides.debug);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_convert_arguments() {
    let args = CliArgs::parse_from(["beacon-cache-proxy", "convert", "/tmp/123.bin"]);

    match args.command.expect("convert command") {
        Command::Convert(convert) => {
            assert_eq!(convert.file, std::path::Path::new("/tmp/123.bin"));
        }
        _ => panic!("wrong command parsed"),
    }
}
