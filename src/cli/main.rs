use relaytrust::crypto::{Jwk, Jwks};
use relaytrust::relay::{
    FetchContext, FileTrustStore, RelaySession, TrustedBundle, UreqTransport,
};
use relaytrust::time::SystemTimeSource;
use relaytrust::{RelayConfig, RelayError};

use relaytrust::reexports::log;

use clap::{Arg, ArgAction, ArgMatches, Command, crate_description, crate_name, crate_version};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Environment variable read when no token file is given
const TOKEN_ENV: &str = "RELAYTRUST_BUNDLE_TOKEN";

fn domain_arg() -> Arg {
    Arg::new("domain")
        .value_name("domain")
        .long("domain")
        .short('D')
        .required(true)
        .help("Tenant domain, e.g. space.backlog.jp")
}

fn relay_arg() -> Arg {
    Arg::new("relay_url")
        .value_name("url")
        .long("relay-url")
        .short('r')
        .required(true)
        .help("Relay base URL")
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, RelayError> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| RelayError::InvalidArgument(format!("Missing --{}", name.replace('_', "-"))))
}

/// Read the bundle token from a file, or from the environment
fn read_token(token_file: Option<&str>) -> Result<String, RelayError> {
    let token = match token_file {
        Some(path) => {
            let data = relaytrust::secure_file::read_secure(Path::new(path))?;
            String::from_utf8(data)
                .map_err(|_| RelayError::InvalidArgument(format!("Token file '{}' is not UTF-8", path)))?
        }
        None => std::env::var(TOKEN_ENV).map_err(|_| {
            RelayError::InvalidArgument(format!("Pass --token-file or set {}", TOKEN_ENV))
        })?,
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(RelayError::InvalidArgument("Bundle token is empty".to_string()));
    }
    Ok(token)
}

/// Bundle summary without the token
fn bundle_json(bundle: &TrustedBundle) -> serde_json::Value {
    json!({
        "domain": bundle.allowed_domain,
        "relay_url": bundle.relay_url,
        "issued_at": bundle.issued_at,
        "expires_at": bundle.expires_at,
        "imported_at": bundle.imported_at,
        "relay_keys": bundle.relay_keys,
    })
}

fn print_json(value: &serde_json::Value) -> Result<(), RelayError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| RelayError::InternalError(e.to_string()))?;
    println!("{}", out);
    Ok(())
}

fn start() -> Result<(), RelayError> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("debug")
                .short('d')
                .action(ArgAction::SetTrue)
                .help("Prints debugging information"),
        )
        .arg(
            Arg::new("home")
                .long("home")
                .value_name("dir")
                .help("Base directory for the certs cache and trust store"),
        )
        .subcommand(
            Command::new("import")
                .about("Download, verify and store a tenant's trust bundle")
                .arg(relay_arg())
                .arg(domain_arg())
                .arg(
                    Arg::new("token_file")
                        .value_name("token_file")
                        .long("token-file")
                        .short('t')
                        .help("File containing the bundle token (default: $RELAYTRUST_BUNDLE_TOKEN)"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Verify the relay's signed info against the stored bundle")
                .arg(domain_arg())
                .arg(
                    Arg::new("force")
                        .long("force")
                        .short('f')
                        .action(ArgAction::SetTrue)
                        .help("Report the bundle as requiring an update"),
                ),
        )
        .subcommand(Command::new("list").about("List stored trust bundles"))
        .subcommand(
            Command::new("certs")
                .about("Show the relay's published signing keys")
                .arg(relay_arg())
                .arg(domain_arg())
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Bypass the cache"),
                ),
        )
        .subcommand(
            Command::new("thumbprint")
                .about("Compute RFC 7638 thumbprints of a JWK or JWKS file")
                .arg(
                    Arg::new("in")
                        .value_name("input_file")
                        .long("input-file")
                        .short('i')
                        .required(true)
                        .help("JWK or JWKS file"),
                ),
        )
        .get_matches();

    let debug = matches.get_flag("debug");

    env_logger::builder()
        .format_timestamp(None)
        .format_level(false)
        .format_module_path(false)
        .format_target(false)
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let mut config = RelayConfig::from_env()?;
    if let Some(home) = matches.get_one::<String>("home") {
        config = config.with_home_dir(home);
    }
    let session = RelaySession::new(
        &config,
        Arc::new(UreqTransport::new(config.request_timeout, config.max_bundle_bytes)),
        Arc::new(FileTrustStore::new(config.store_path())),
        Arc::new(SystemTimeSource),
    );
    let ctx = FetchContext::with_timeout(config.request_timeout);

    if let Some(matches) = matches.subcommand_matches("import") {
        let relay_url = required(matches, "relay_url")?;
        let domain = required(matches, "domain")?;
        let token_file = matches.get_one::<String>("token_file").map(|s| s.as_str());
        let token = read_token(token_file)?;
        let bundle = session.import(relay_url, domain, &token, &ctx)?;
        print_json(&bundle_json(&bundle))?;
    } else if let Some(matches) = matches.subcommand_matches("status") {
        let domain = required(matches, "domain")?;
        let force = matches.get_flag("force");
        let check = session.check(domain, force, &ctx)?;
        print_json(&json!({
            "domain": domain,
            "valid": check.valid,
            "update_required": check.update_required.as_ref().map(|u| u.to_string()),
            "info_expires_at": check.info.expires_at,
            "update_before": check.info.update_before,
        }))?;
        if !check.valid {
            std::process::exit(2);
        }
    } else if matches.subcommand_matches("list").is_some() {
        let bundles = session.bundles().all()?;
        let summaries: Vec<_> = bundles.iter().map(bundle_json).collect();
        print_json(&json!(summaries))?;
    } else if let Some(matches) = matches.subcommand_matches("certs") {
        let relay_url = required(matches, "relay_url")?;
        let domain = required(matches, "domain")?;
        let jwks = if matches.get_flag("refresh") {
            session.certs().refresh(relay_url, domain, &ctx)?
        } else {
            session.certs().jwks(relay_url, domain, &ctx)?
        };
        print_json(&json!(describe_keys(&jwks.keys)))?;
    } else if let Some(matches) = matches.subcommand_matches("thumbprint") {
        let input_file = required(matches, "in")?;
        let data = std::fs::read(input_file)?;
        let keys = match Jwks::from_slice(&data) {
            Ok(jwks) => jwks.keys,
            Err(_) => vec![serde_json::from_slice::<Jwk>(&data).map_err(|e| {
                RelayError::ParseError(format!("{}: not a JWK or JWKS: {}", input_file, e))
            })?],
        };
        print_json(&json!(describe_keys(&keys)))?;
    } else {
        return Err(RelayError::InvalidArgument(
            "No subcommand given; run with --help".to_string(),
        ));
    }
    Ok(())
}

fn describe_keys(keys: &[Jwk]) -> Vec<serde_json::Value> {
    keys.iter()
        .map(|key| match key.thumbprint() {
            Ok(thumbprint) => json!({ "kid": key.kid, "thumbprint": thumbprint }),
            Err(e) => json!({ "kid": key.kid, "error": e.to_string() }),
        })
        .collect()
}

fn main() -> Result<(), RelayError> {
    let res = start();
    match res {
        Ok(_) => {}
        Err(e) => {
            eprintln!("{e}");
            if e.requires_reauthentication() {
                eprintln!("Re-run `{} import` to refresh the trust bundle.", crate_name!());
            } else if e.indicates_tampering() {
                eprintln!("The relay's response failed verification; do not use this relay.");
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
