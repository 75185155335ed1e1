use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "statusd", version, about = "Host status report served over HTTP")]
pub(crate) struct Args {
    /// Listen address; `:port` binds every interface.
    #[arg(short = 'p', long, default_value = ":8080")]
    pub(crate) listen_addr: String,
    /// Secret path segment the status route is served under.
    #[arg(short = 't', long, default_value = "")]
    pub(crate) token: String,
    #[arg(long, default_value_t = false)]
    pub(crate) ssl: bool,
    #[arg(long, default_value = "cert.pem")]
    pub(crate) cert: PathBuf,
    #[arg(long, default_value = "key.pem")]
    pub(crate) key: PathBuf,
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
}
