//! `certmgr` command line: a thin layer over [`certmgr::manager::CertManager`].

use std::path::PathBuf;
use std::process::ExitCode;

use certmgr::cert::params::ValiditySpec;
use certmgr::cert::template::{CertificateRole, SignArgs};
use certmgr::config::{Config, DEFAULT_CONFIG_PATH};
use certmgr::error::CertMgrError;
use certmgr::key::KeyAlgorithm;
use certmgr::manager::CertManager;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `CERTMGR_LOG=debug`.
const LOG_ENV: &str = "CERTMGR_LOG";

/// Local certificate authority: keys, CSRs, certificates and PKCS#12 bundles.
///
/// Artifacts are stored as `<basename>.priv.pem`, `<basename>.csr.pem`,
/// `<basename>.cert.pem` and `<basename>.p12` under the configured root
/// directory (`CERTMGR_ROOT_DIR` overrides it).
#[derive(Parser, Debug)]
#[command(name = "certmgr", version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a private key and a CSR for it, named after the basename
    #[command(name = "createkeyandcsr")]
    CreateKeyAndCsr {
        #[command(flatten)]
        key: KeyFlags,
        basename: String,
    },

    /// Generate a private key and issue a certificate for it
    #[command(name = "createkeyandcert")]
    CreateKeyAndCert {
        #[command(flatten)]
        key: KeyFlags,
        #[command(flatten)]
        sign: SignFlags,
        /// ca, server or client
        role: String,
        basename: String,
    },

    /// Issue a certificate for an existing CSR
    #[command(name = "signcsr")]
    SignCsr {
        #[command(flatten)]
        sign: SignFlags,
        /// ca, server or client
        role: String,
        basename: String,
    },

    /// Export a key and its certificate as a PKCS#12 bundle
    #[command(name = "topkcs12")]
    ToPkcs12 { basename: String },
}

#[derive(Args, Debug)]
struct KeyFlags {
    /// Key type: rsa or ecc
    #[arg(long = "type", default_value = "rsa")]
    key_type: String,

    /// Key size (2048, 4096) or curve (secp256r1, secp384r1)
    #[arg(long, default_value = "default")]
    size: String,
}

impl KeyFlags {
    fn algorithm(&self) -> Result<KeyAlgorithm, CertMgrError> {
        KeyAlgorithm::from_type_and_size(&self.key_type, &self.size)
    }
}

#[derive(Args, Debug)]
struct SignFlags {
    /// Basename of the signing key and certificate
    #[arg(long, default_value = "")]
    signer: String,

    /// Common name of the subject
    #[arg(long, default_value = "")]
    cn: String,

    /// Comma-separated DNS names
    #[arg(long, default_value = "")]
    dns: String,

    /// Self-sign the certificate (ca only)
    #[arg(long)]
    selfsigned: bool,

    /// Validity: a number followed by d (days), m (31 days) or y (372 days)
    #[arg(long, default_value = "1y")]
    validity: String,
}

impl SignFlags {
    fn to_sign_args(&self) -> Result<SignArgs, CertMgrError> {
        Ok(SignArgs::builder()
            .common_name(self.cn.as_str())
            .dns_names(self.dns.as_str())
            .signer(self.signer.as_str())
            .self_signed(self.selfsigned)
            .validity(self.validity.parse::<ValiditySpec>()?)
            .build())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env(LOG_ENV))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CertMgrError> {
    let config = Config::from_file(&cli.config)?;
    let manager = CertManager::from_config(&config);

    match cli.command {
        Command::CreateKeyAndCsr { key, basename } => {
            manager.create_key_and_csr(&basename, key.algorithm()?)?;
        }
        Command::CreateKeyAndCert {
            key,
            sign,
            role,
            basename,
        } => {
            let role: CertificateRole = role.parse()?;
            let algorithm = key.algorithm()?;
            manager.create_key_and_cert(role, &basename, algorithm, &sign.to_sign_args()?)?;
        }
        Command::SignCsr {
            sign,
            role,
            basename,
        } => {
            let role: CertificateRole = role.parse()?;
            manager.sign_csr(role, &basename, &sign.to_sign_args()?)?;
        }
        Command::ToPkcs12 { basename } => {
            let password = manager.to_pkcs12(&basename)?;
            println!("Password: {password}");
        }
    }
    Ok(())
}

/// The error followed by its chain of causes.
fn render_error(err: &CertMgrError) -> String {
    let mut rendered = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}
