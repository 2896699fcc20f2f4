/*!
Stored uploads (ID photos).

A `MediaStore` owns one directory. Files go in under short random
basenames, so a reference never collides and never carries a
client-chosen name; the reference that comes back out is the only handle
the rest of the system holds, and `/storage/<reference>` is the URL the
front end fetches it from.
*/
use std::io;
use std::path::{Path, PathBuf};

use rand::{Rng, distributions};

const REFERENCE_LENGTH: usize = 16;
const REFERENCE_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// File extensions accepted for ID photo uploads.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Largest accepted upload (photo or roster file).
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

/// The extension of an uploaded file's name, lowercased, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Open (creating if necessary) the media directory at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<MediaStore, String> {
        let root = root.as_ref().to_owned();
        log::trace!("MediaStore::new( {:?} ) called.", &root);

        std::fs::create_dir_all(&root)
            .map_err(|e| format!(
                "Unable to create media directory {}: {}",
                root.display(), &e
            ))?;

        Ok(MediaStore { root })
    }

    fn generate_reference(&self, ext: &str) -> String {
        let chars: Vec<char> = REFERENCE_CHARS.chars().collect();
        // REFERENCE_CHARS is a nonempty literal.
        let dist = distributions::Slice::new(&chars).unwrap();
        let rng = rand::thread_rng();
        let stem: String = rng.sample_iter(&dist)
            .take(REFERENCE_LENGTH)
            .collect();
        format!("{}.{}", stem, ext)
    }

    /**
    Write `bytes` to stable storage and return the new file's reference.

    `ext` should be the (already vetted) file extension; the basename is
    random. In the pathological case that the generated name is already
    taken, we just roll again.
    */
    pub fn store(&self, ext: &str, bytes: &[u8]) -> Result<String, io::Error> {
        log::trace!(
            "MediaStore::store( {:?}, [ {} bytes ] ) called.",
            ext, bytes.len()
        );

        let mut reference = self.generate_reference(ext);
        while self.root.join(&reference).exists() {
            reference = self.generate_reference(ext);
        }

        std::fs::write(self.root.join(&reference), bytes)?;
        log::trace!("    ...stored as {:?}.", &reference);
        Ok(reference)
    }

    /// Remove the stored file `reference` refers to.
    ///
    /// References are single path components; anything else is refused.
    pub fn delete(&self, reference: &str) -> Result<(), io::Error> {
        log::trace!("MediaStore::delete( {:?} ) called.", reference);

        if reference.is_empty()
            || reference.contains('/')
            || reference.contains('\\')
            || reference.contains("..")
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} is not a media reference", reference),
            ));
        }

        std::fs::remove_file(self.root.join(reference))
    }

    /// The URL path the front end fetches this reference from.
    pub fn url(reference: &str) -> String {
        format!("/storage/{}", reference)
    }

    pub fn root(&self) -> &Path { &self.root }
}
