use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "sbg-reports",
    version,
    about = "Split, identify and consolidate scanned class report PDFs per student"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Process(ProcessArgs),
    Classify(ClassifyArgs),
    Status(StatusArgs),
}

/// Locations shared by every command. Unset paths resolve under `staging_root`.
#[derive(Args, Debug, Clone)]
pub struct StagingArgs {
    #[arg(long, default_value = ".")]
    pub staging_root: PathBuf,

    #[arg(long)]
    pub inbox: Option<PathBuf>,

    #[arg(long)]
    pub output_root: Option<PathBuf>,

    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl StagingArgs {
    pub fn inbox_dir(&self) -> PathBuf {
        self.inbox
            .clone()
            .unwrap_or_else(|| self.staging_root.join("To_Process"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.staging_root.join("Processed"))
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.manifest_dir
            .clone()
            .unwrap_or_else(|| self.staging_root.join("manifests"))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.manifests_dir().join("run_state.sqlite")
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub staging: StagingArgs,

    #[arg(long)]
    pub roster_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TextBackend::Auto)]
    pub text_backend: TextBackend,

    #[arg(long)]
    pub blank_page_max_bytes: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub overwrite_reports: bool,

    #[arg(long, default_value_t = false)]
    pub skip_roster: bool,
}

impl ProcessArgs {
    pub fn roster_file(&self) -> PathBuf {
        self.roster_path
            .clone()
            .unwrap_or_else(|| self.staging.staging_root.join("StudentIDs.csv"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    #[command(flatten)]
    pub staging: StagingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub staging: StagingArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TextBackend {
    Auto,
    Pdftotext,
    Lopdf,
}

impl TextBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Pdftotext => "pdftotext",
            Self::Lopdf => "lopdf",
        }
    }
}
