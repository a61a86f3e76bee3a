//! Certify a PDF from the command line.
//!
//! Usage:
//!   pdf-seal --config seal.json input.pdf output.pdf
//!   pdf-seal --config seal.json --content-type application/pdf input.pdf output.pdf
//!
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=pdf_seal=debug`).

use pdf_seal::config::SealConfig;
use pdf_seal::service::{SigningService, Upload, PDF_CONTENT_TYPE};
use pdf_seal::signatures::{Pkcs12KeyProvider, RevocationCollector};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "usage: pdf-seal --config <config.json> [--content-type <mime>] <input.pdf> <output.pdf>";

struct CliArgs {
    config: PathBuf,
    content_type: String,
    input: PathBuf,
    output: PathBuf,
}

impl CliArgs {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut content_type = PDF_CONTENT_TYPE.to_string();
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    config = Some(PathBuf::from(args.get(i).ok_or("--config needs a value")?));
                },
                "--content-type" => {
                    i += 1;
                    content_type = args.get(i).ok_or("--content-type needs a value")?.clone();
                },
                "--help" | "-h" => return Err(USAGE.to_string()),
                flag if flag.starts_with("--") => return Err(format!("unknown option {}\n{}", flag, USAGE)),
                value => positional.push(PathBuf::from(value)),
            }
            i += 1;
        }

        let config = config.ok_or_else(|| format!("--config is required\n{}", USAGE))?;
        let [input, output]: [PathBuf; 2] = positional
            .try_into()
            .map_err(|_| format!("expected an input and an output file\n{}", USAGE))?;

        Ok(Self {
            config,
            content_type,
            input,
            output,
        })
    }
}

fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = SealConfig::from_json_file(&args.config)?;
    let keys = Arc::new(Pkcs12KeyProvider::new(config.keystore.clone()).with_scheme(config.scheme));
    let collector = RevocationCollector::from_config(&config.revocation)?;
    let service = SigningService::new(config, keys, collector);

    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    let upload = Upload {
        filename,
        content_type: args.content_type,
        bytes: std::fs::read(&args.input)?,
    };

    let signed = service.sign_upload(upload)?;
    for warning in &signed.warnings {
        eprintln!("warning: {}", warning);
    }
    std::fs::write(&args.output, &signed.bytes)?;
    println!("{} -> {} ({} bytes)", args.input.display(), args.output.display(), signed.bytes.len());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match CliArgs::from_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        },
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
