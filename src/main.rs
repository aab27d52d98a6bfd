use anyhow::Context;
use clap::Parser;
use cpi::actions::default_actions;
use cpi::config::load_config;
use cpi::dispatcher::dispatch;
use cpi::{CpiContext, CpiError, Request, Response};
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::error;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH_FLAG: &str = "configPath";

#[derive(Parser, Debug)]
#[command(name = "cpi")]
#[command(about = "BOSH cloud provider interface for Photon Controller")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long = "configPath", value_name = "PATH")]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();

    let response = match prepare(std::env::args_os()).await {
        Ok((ctx, request)) => {
            dispatch(&ctx, &default_actions(), &request.method, &request.arguments).await
        }
        Err(err) => {
            error!("{err:#}");
            Response::from_error(&startup_error(&err), String::new())
        }
    };

    println!("{}", response.to_json_line());
}

async fn prepare<I>(args: I) -> anyhow::Result<(CpiContext, Request)>
where
    I: IntoIterator<Item = OsString>,
{
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Error reading from stdin")?;

    let request: Request = serde_json::from_str(&input)
        .context("Error deserializing JSON request from bosh")?;

    let cli = Cli::try_parse_from(normalize_args(args))
        .context("Error parsing command line arguments")?;

    let config = load_config(&cli.config_path).await.with_context(|| {
        format!(
            "Unable to load photon config from path '{}'",
            cli.config_path.display()
        )
    })?;

    let ctx = CpiContext::from_config(config).context("Unable to create photon client")?;
    Ok((ctx, request))
}

/// Accepts the single-dash `-configPath` spelling the director passes.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let single_dash = format!("-{CONFIG_PATH_FLAG}");
    args.into_iter()
        .map(|arg| {
            let rewritten = arg
                .to_str()
                .filter(|text| *text == single_dash || text.starts_with(&format!("{single_dash}=")))
                .map(|text| OsString::from(format!("-{text}")));
            rewritten.unwrap_or(arg)
        })
        .collect()
}

fn startup_error(err: &anyhow::Error) -> CpiError {
    let cause = err
        .chain()
        .skip(1)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    CpiError::cpi(cause, err)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::{normalize_args, startup_error, Cli};
    use anyhow::Context;
    use clap::Parser;
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn given_single_dash_flag_when_normalized_then_clap_accepts_it() {
        let args = normalize_args(os(&["cpi", "-configPath", "/etc/photon.json"]));

        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.config_path, PathBuf::from("/etc/photon.json"));
    }

    #[test]
    fn given_single_dash_flag_with_equals_when_normalized_then_value_is_kept() {
        let args = normalize_args(os(&["cpi", "-configPath=/tmp/c.json"]));

        assert_eq!(args, os(&["cpi", "--configPath=/tmp/c.json"]));
    }

    #[test]
    fn given_missing_flag_when_parsed_then_error_is_returned() {
        assert!(Cli::try_parse_from(normalize_args(os(&["cpi"]))).is_err());
    }

    #[test]
    fn given_context_chain_when_converted_then_cpi_message_names_context_and_cause() {
        let err = Err::<(), _>(std::io::Error::other("EOF"))
            .context("Error reading from stdin")
            .unwrap_err();

        assert_eq!(
            startup_error(&err).to_string(),
            "CPI error: 'Error reading from stdin' | Caused by: 'EOF'"
        );
    }
}
