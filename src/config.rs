/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::media::MediaStore;
use crate::store::Store;

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    media_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug)]
pub struct Cfg {
    pub db_connect_string: String,
    pub media_dir: PathBuf,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=lanyard_test password='lanyard_test' dbname=lanyard_store_test".to_owned(),
            media_dir: PathBuf::from("storage"),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(p) = cf.media_dir {
            c.media_dir = p;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }
}

/**
This guy hauls around the shared resources and gets passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Store,
    pub media: MediaStore,
    pub addr: SocketAddr,
}

/// Loads system configuration, ensures the database tables exist, and
/// opens the media directory.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let path = path.as_ref();
    let cfg = if path.exists() {
        Cfg::from_file(path)?
    } else {
        log::info!(
            "No config file at {}; using default configuration.",
            path.display()
        );
        Cfg::default()
    };
    log::info!("Configuration:\n{:#?}", &cfg);

    log::trace!("Checking state of data DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    let media = MediaStore::new(&cfg.media_dir)?;
    log::trace!("Media directory {} okay.", cfg.media_dir.display());

    Ok(Glob {
        store,
        media,
        addr: cfg.addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let c = Cfg::default();
        assert_eq!(c.addr.port(), 8001);
        assert_eq!(c.media_dir, PathBuf::from("storage"));
    }

    #[test]
    fn partial_config_file() {
        use std::io::Write;

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "port = 9999\nmedia_dir = \"/tmp/lanyard-media\"").unwrap();

        let c = Cfg::from_file(f.path()).unwrap();
        assert_eq!(c.addr.port(), 9999);
        assert_eq!(c.media_dir, PathBuf::from("/tmp/lanyard-media"));
        // Unset keys keep their defaults.
        assert_eq!(c.db_connect_string, Cfg::default().db_connect_string);
    }

    #[test]
    fn bad_host_is_an_error() {
        use std::io::Write;

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "host = \"not-an-ip\"").unwrap();
        assert!(Cfg::from_file(f.path()).is_err());
    }
}
