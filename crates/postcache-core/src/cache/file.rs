use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{KeyValueStore, SessionCipher, StoreError};

/// One JSON file per key under a directory chosen by the caller.
pub struct FileStore {
    dir: PathBuf,
    cipher: Option<SessionCipher>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cipher: None,
        }
    }

    /// Encrypt session files at rest.
    pub fn with_cipher(mut self, cipher: SessionCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.entry_path(key);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match (&self.cipher, SessionCipher::is_encrypted(&contents)) {
            (Some(cipher), true) => cipher.decrypt(&contents).map(Some),
            (None, true) => Err(StoreError::Crypto(format!(
                "{} is encrypted but no session passphrase is configured",
                path.display()
            ))),
            (Some(_), false) => {
                // Rewritten encrypted on the next save.
                warn!(path = %path.display(), "Read unencrypted session file");
                Ok(Some(contents))
            }
            (None, false) => Ok(Some(contents)),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let contents = match &self.cipher {
            Some(cipher) => cipher.encrypt(&value)?,
            None => value,
        };

        // Write then rename so a crash never leaves a half-written session.
        // Each writer gets its own temp file; the last rename wins.
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!(
            ".{}.{}.{:08x}.json.tmp",
            key,
            std::process::id(),
            rand::random::<u32>()
        ));
        tokio::fs::write(&tmp, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), "Wrote session file");
        Ok(())
    }
}
