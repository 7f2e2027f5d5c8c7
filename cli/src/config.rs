use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("larder.db");
        let images_dir = data_dir.join("images");

        Ok(Config {
            db_path,
            data_dir,
            images_dir,
        })
    }

    /// Load the API key from disk, or generate a new one.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok(key)
    }
}

/// Credentials for the external services. Each can come from a flag or its
/// environment variable; anything missing disables that integration.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ApiSettings {
    /// Spoonacular API key for external recipe search
    #[arg(long, global = true, env = "LARDER_SPOONACULAR_KEY", hide_env_values = true)]
    pub spoonacular_key: Option<String>,
    /// SendGrid API key for emailing grocery lists
    #[arg(long, global = true, env = "LARDER_SENDGRID_KEY", hide_env_values = true)]
    pub sendgrid_key: Option<String>,
    /// Sender address for grocery list emails
    #[arg(long, global = true, env = "LARDER_MAIL_FROM")]
    pub mail_from: Option<String>,
    /// Twilio account SID for texting grocery lists
    #[arg(long, global = true, env = "LARDER_TWILIO_SID", hide_env_values = true)]
    pub twilio_sid: Option<String>,
    /// Twilio auth token
    #[arg(long, global = true, env = "LARDER_TWILIO_TOKEN", hide_env_values = true)]
    pub twilio_token: Option<String>,
    /// Twilio sending phone number
    #[arg(long, global = true, env = "LARDER_TWILIO_FROM")]
    pub twilio_from: Option<String>,
}
