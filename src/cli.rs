use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobrelay")]
#[command(about = "Submit, track and download remote processing jobs", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $JOBRELAY_CONFIG or config/jobrelay.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print events as JSON lines on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll a job until it finishes, then download its artifact
    Watch {
        job_id: String,
    },

    /// Upload a file for processing and save the returned image
    Submit(SubmitArgs),

    /// Download the artifact of a finished job
    Download {
        job_id: String,
    },

    /// List jobs, refreshing periodically
    Jobs {
        /// Fetch the listing once and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// File to upload
    pub file: PathBuf,

    /// Data type identifier sent to the server
    #[arg(long, required_unless_present = "pipeline", conflicts_with = "pipeline")]
    pub datatype_id: Option<String>,

    /// Pipeline name from the `pipelines` configuration
    #[arg(long)]
    pub pipeline: Option<String>,

    /// Image type value sent to the server
    #[arg(long, conflicts_with = "image")]
    pub image_type: Option<String>,

    /// Image label from the `image_types` configuration; defaults to the pipeline's image
    #[arg(long)]
    pub image: Option<String>,
}
