use clap::Parser;

use crate::bundle::ExtractOptions;

#[derive(Parser, Debug)]
#[command(name = "hpfw")]
#[command(version)]
#[command(about = "An HP firmware bundle inspection and extraction utility", long_about = None)]
#[command(after_help = "Examples:\n  \
  hpfw firmware.bdl                     extract every package next to the bundle\n  \
  hpfw -l firmware.bdl                  list packages and their files\n  \
  hpfw -v https://example.com/fw.bdl    inspect a remote bundle via Range requests\n  \
  hpfw -d out -c firmware.bdl Kernel    extract only Kernel into out/, verifying CRCs\n  \
  hpfw -s firmware.bdl                  split into raw .pkg sub-containers")]
pub struct Cli {
    /// Bundle file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Packages to select (with -p: files), default: all
    #[arg(value_name = "NAMES")]
    pub names: Vec<String>,

    /// List contents (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// Show full header and signature details
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract matching file entries to stdout, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude packages that follow
    #[arg(short = 'x', value_name = "PACKAGE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Test file checksums without extracting
    #[arg(short = 't')]
    pub test: bool,

    /// Verify file checksums while extracting
    #[arg(short = 'c')]
    pub check: bool,

    /// Extract packages as raw .pkg files instead of unpacking them
    #[arg(short = 's', long)]
    pub split: bool,

    /// Treat FILE as a standalone package (.ipkg) instead of a bundle
    #[arg(long = "pkg")]
    pub package: bool,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            verify: self.check,
            quiet: self.is_quiet(),
            overwrite: self.overwrite,
            never_overwrite: self.never_overwrite,
        }
    }
}
