use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::selection::{SelectionMode, Selector};
use crate::capabilities::Capabilities;

/// Size of each chunk copied from a download stream to disk.
pub const DOWNLOAD_CHUNK: usize = 8192;

pub const PASSWORD_ENV: &str = "PHOTO_FRAME_REMOTE_PASSWORD";
pub const SECOND_FACTOR_ENV: &str = "PHOTO_FRAME_REMOTE_CODE";

/// One photo in the remote library.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    #[serde(default)]
    pub filename: String,
}

impl RemoteAsset {
    /// Lowercase extension of the original filename, `jpg` when absent.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "jpg".to_string())
    }

    /// File name inside the cache folder, unique per id. ASCII letters,
    /// digits and `-` are kept; every other byte becomes `_XX` (hex).
    pub fn cache_name(&self) -> String {
        let mut name = String::with_capacity(self.id.len() + 5);
        for byte in self.id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(char::from(byte));
            } else {
                let _ = write!(name, "_{byte:02X}");
            }
        }
        let _ = write!(name, ".{}", self.extension());
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignIn {
    Complete,
    SecondFactorRequired,
}

/// The cloud photo service as seen by the catalog.
pub trait RemoteLibrary: Send {
    /// Reuses a persisted session; `false` when it has expired.
    fn resume_session(&mut self, token: &str) -> Result<bool>;
    fn sign_in(&mut self, account: &str, password: &str) -> Result<SignIn>;
    fn validate_second_factor(&mut self, code: &str) -> Result<bool>;
    /// Token worth persisting after a successful sign-in.
    fn session_token(&self) -> Option<String>;
    fn list_assets(&mut self) -> Result<Vec<RemoteAsset>>;
    /// Streams the original-quality bytes of `asset`.
    fn download_original(&mut self, asset: &RemoteAsset) -> Result<Box<dyn Read + Send>>;
}

/// Source of interactive credentials.
pub trait CredentialPrompt: Send {
    fn password(&mut self, account: &str) -> Result<String>;
    fn second_factor_code(&mut self) -> Result<String>;
}

/// Reads credentials from the environment, falling back to stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(prompt: &str) -> Result<String> {
        eprint!("{prompt}");
        io::stderr().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            bail!("no input available for prompt");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl CredentialPrompt for TerminalPrompt {
    fn password(&mut self, account: &str) -> Result<String> {
        match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => Ok(password),
            _ => Self::ask(&format!("Password for {account}: ")),
        }
    }

    fn second_factor_code(&mut self) -> Result<String> {
        match std::env::var(SECOND_FACTOR_ENV) {
            Ok(code) if !code.is_empty() => Ok(code),
            _ => Self::ask("Enter the verification code sent to your devices: "),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    account: String,
    token: String,
}

/// Photos from a cloud library, downloaded into a local cache on first use.
pub struct RemoteCatalog {
    account: String,
    session_path: PathBuf,
    cache_dir: PathBuf,
    caps: Capabilities,
    library: Box<dyn RemoteLibrary>,
    prompt: Box<dyn CredentialPrompt>,
    authenticated: bool,
    assets: Vec<RemoteAsset>,
    selector: Selector,
}

impl RemoteCatalog {
    pub fn new(
        account: impl Into<String>,
        session_path: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        caps: Capabilities,
        library: Box<dyn RemoteLibrary>,
        prompt: Box<dyn CredentialPrompt>,
        selector: Selector,
    ) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(err) = fs::create_dir_all(&cache_dir) {
            warn!(cache = %cache_dir.display(), "could not create remote cache: {err}");
        }
        Self {
            account: account.into(),
            session_path: session_path.into(),
            cache_dir,
            caps,
            library,
            prompt,
            authenticated: false,
            assets: Vec::new(),
            selector,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Signs in if needed, then lists the library. Any failure leaves the
    /// catalog empty until the next successful refresh.
    pub fn refresh(&mut self) -> usize {
        if !self.authenticated {
            match self.authenticate() {
                Ok(true) => self.authenticated = true,
                Ok(false) => {
                    self.assets.clear();
                    return 0;
                }
                Err(err) => {
                    error!(account = %self.account, "remote authentication failed: {err:#}");
                    self.assets.clear();
                    return 0;
                }
            }
        }
        match self.library.list_assets() {
            Ok(assets) => {
                let total = assets.len();
                self.assets = assets
                    .into_iter()
                    .filter(|a| self.caps.supports_extension(&a.extension()))
                    .collect();
                info!(count = self.assets.len(), skipped = total - self.assets.len(), "remote photos listed");
            }
            Err(err) => {
                error!("error listing remote photos: {err:#}");
                self.assets.clear();
                // the session may have expired; sign in again next time
                self.authenticated = false;
            }
        }
        self.assets.len()
    }

    fn authenticate(&mut self) -> Result<bool> {
        if let Some(token) = self.stored_token() {
            match self.library.resume_session(&token) {
                Ok(true) => {
                    info!(account = %self.account, "resumed remote session");
                    return Ok(true);
                }
                Ok(false) => info!("stored remote session expired; signing in again"),
                Err(err) => warn!("could not resume remote session: {err:#}"),
            }
        }

        let password = self.prompt.password(&self.account)?;
        info!(account = %self.account, "signing in to remote library");
        if self.library.sign_in(&self.account, &password)? == SignIn::SecondFactorRequired {
            info!("second factor required; enter the code sent to your devices");
            let code = self.prompt.second_factor_code()?;
            if !self.library.validate_second_factor(code.trim())? {
                error!("invalid second-factor code");
                return Ok(false);
            }
        }
        if let Some(token) = self.library.session_token() {
            if let Err(err) = self.store_token(&token) {
                warn!("could not persist remote session: {err:#}");
            }
        }
        info!("remote authentication successful");
        Ok(true)
    }

    fn stored_token(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.session_path).ok()?;
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(session) if session.account == self.account => Some(session.token),
            Ok(_) => None,
            Err(err) => {
                debug!("ignoring unreadable session file: {err}");
                None
            }
        }
    }

    fn store_token(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.session_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let session = StoredSession {
            account: self.account.clone(),
            token: token.to_string(),
        };
        fs::write(&self.session_path, serde_json::to_vec(&session)?)
            .with_context(|| format!("failed to write {}", self.session_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.session_path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.assets.len()
    }

    /// Local cached copy of the photo, downloading it on first request.
    pub fn get_path(&mut self, index: usize) -> Option<PathBuf> {
        let asset = self.assets.get(index)?.clone();
        let dest = self.cache_dir.join(asset.cache_name());
        if dest.is_file() {
            debug!(path = %dest.display(), "serving remote photo from cache");
            return Some(dest);
        }
        if !self.authenticated {
            return None;
        }
        match self.download(&asset, &dest) {
            Ok(bytes) => {
                info!(id = %asset.id, bytes, path = %dest.display(), "downloaded remote photo");
                Some(dest)
            }
            Err(err) => {
                error!(id = %asset.id, "error downloading photo: {err:#}");
                None
            }
        }
    }

    fn download(&mut self, asset: &RemoteAsset, dest: &Path) -> Result<u64> {
        let mut stream = self.library.download_original(asset)?;
        let partial = dest.with_extension("part");
        let written = copy_chunked(&mut stream, &partial).inspect_err(|_| {
            let _ = fs::remove_file(&partial);
        })?;
        fs::rename(&partial, dest)
            .with_context(|| format!("failed to move download into {}", dest.display()))?;
        Ok(written)
    }

    pub fn load(&mut self, index: usize) -> Option<Vec<u8>> {
        let path = self.get_path(index)?;
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                error!(path = %path.display(), "failed to read cached photo: {err}");
                None
            }
        }
    }

    pub fn select(&mut self) -> Option<usize> {
        self.selector.select(self.assets.len())
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selector.mode()
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selector.set_mode(mode);
    }

    /// Deletes every cached file and returns how many were removed.
    pub fn clear_cache(&self) -> usize {
        clear_cache_dir(&self.cache_dir)
    }
}

/// Deletes every regular file directly inside `dir`.
pub fn clear_cache_dir(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!(cache = %dir.display(), "error clearing cache: {err}");
            return 0;
        }
    };
    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), "could not remove cached file: {err}"),
        }
    }
    info!(removed, "cleared cached photos");
    removed
}

fn copy_chunked(reader: &mut dyn Read, dest: &Path) -> Result<u64> {
    let mut file =
        File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let mut buf = [0u8; DOWNLOAD_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("download stream failed"),
        };
        file.write_all(&buf[..n])?;
        total += n as u64;
    }
    file.sync_all()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        sign_ins: usize,
        resumes: usize,
        downloads: usize,
        failing_lists: usize,
    }

    struct StubLibrary {
        calls: Arc<Mutex<Calls>>,
        second_factor: bool,
        accept_code: bool,
        resume_ok: bool,
    }

    impl RemoteLibrary for StubLibrary {
        fn resume_session(&mut self, _token: &str) -> Result<bool> {
            self.calls.lock().unwrap().resumes += 1;
            Ok(self.resume_ok)
        }
        fn sign_in(&mut self, _account: &str, password: &str) -> Result<SignIn> {
            self.calls.lock().unwrap().sign_ins += 1;
            if password != "hunter2" {
                bail!("bad password");
            }
            Ok(if self.second_factor { SignIn::SecondFactorRequired } else { SignIn::Complete })
        }
        fn validate_second_factor(&mut self, code: &str) -> Result<bool> {
            Ok(self.accept_code && code == "123456")
        }
        fn session_token(&self) -> Option<String> {
            Some("tok".into())
        }
        fn list_assets(&mut self) -> Result<Vec<RemoteAsset>> {
            let mut calls = self.calls.lock().unwrap();
            if calls.failing_lists > 0 {
                calls.failing_lists -= 1;
                bail!("401 session expired");
            }
            Ok(vec![
                RemoteAsset { id: "A/1".into(), filename: "beach.JPG".into() },
                RemoteAsset { id: "B2".into(), filename: "phone.heic".into() },
                RemoteAsset { id: "C3".into(), filename: String::new() },
            ])
        }
        fn download_original(&mut self, asset: &RemoteAsset) -> Result<Box<dyn Read + Send>> {
            self.calls.lock().unwrap().downloads += 1;
            Ok(Box::new(Cursor::new(vec![7u8; DOWNLOAD_CHUNK * 2 + asset.id.len()])))
        }
    }

    struct FixedPrompt(&'static str);

    impl CredentialPrompt for FixedPrompt {
        fn password(&mut self, _account: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
        fn second_factor_code(&mut self) -> Result<String> {
            Ok("123456\n".to_string())
        }
    }

    fn catalog(dir: &Path, lib: StubLibrary, password: &'static str) -> RemoteCatalog {
        RemoteCatalog::new(
            "me@example.com",
            dir.join("session.json"),
            dir.join("cache"),
            Capabilities::baseline(),
            Box::new(lib),
            Box::new(FixedPrompt(password)),
            Selector::new(SelectionMode::Sequential),
        )
    }

    fn stub(calls: &Arc<Mutex<Calls>>) -> StubLibrary {
        StubLibrary {
            calls: Arc::clone(calls),
            second_factor: true,
            accept_code: true,
            resume_ok: true,
        }
    }

    #[test]
    fn cache_names_escape_unsafe_bytes() {
        let asset = RemoteAsset { id: "A/1".into(), filename: "x.PNG".into() };
        assert_eq!(asset.cache_name(), "A_2F1.png");
        let names: Vec<_> = ["AbC+1", "AbC/1", "AbC_1", "AbC_2B1"]
            .into_iter()
            .map(|id| RemoteAsset { id: id.into(), filename: String::new() }.cache_name())
            .collect();
        assert_eq!(names, vec!["AbC_2B1.jpg", "AbC_2F1.jpg", "AbC_5F1.jpg", "AbC_5F2B1.jpg"]);
        let bare = RemoteAsset { id: "z".into(), filename: String::new() };
        assert_eq!(bare.cache_name(), "z.jpg");
    }

    #[test]
    fn second_factor_sign_in_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut remote = catalog(dir.path(), stub(&calls), "hunter2");
        // heic is filtered without the decoder
        assert_eq!(remote.refresh(), 2);
        assert!(remote.is_authenticated());

        let saved = fs::read_to_string(dir.path().join("session.json")).unwrap();
        assert!(saved.contains("\"tok\""));

        // a new catalog resumes instead of prompting again
        let mut again = catalog(dir.path(), stub(&calls), "wrong");
        assert_eq!(again.refresh(), 2);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.sign_ins, 1);
        assert_eq!(calls.resumes, 1);
    }

    #[test]
    fn auth_failure_means_zero_photos() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut remote = catalog(dir.path(), stub(&calls), "wrong");
        assert_eq!(remote.refresh(), 0);
        assert_eq!(remote.select(), None);
        assert_eq!(remote.get_path(0), None);

        let mut rejected = StubLibrary { accept_code: false, ..stub(&calls) };
        rejected.resume_ok = false;
        let mut remote = catalog(dir.path(), rejected, "hunter2");
        assert_eq!(remote.refresh(), 0);
        assert!(!remote.is_authenticated());
    }

    #[test]
    fn listing_failure_forces_new_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut remote = catalog(dir.path(), stub(&calls), "hunter2");
        assert_eq!(remote.refresh(), 2);

        calls.lock().unwrap().failing_lists = 1;
        assert_eq!(remote.refresh(), 0);
        assert!(!remote.is_authenticated());

        assert_eq!(remote.refresh(), 2);
        assert!(remote.is_authenticated());
        assert_eq!(calls.lock().unwrap().resumes, 1);
    }

    #[test]
    fn clear_cache_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut remote = catalog(dir.path(), stub(&calls), "hunter2");
        remote.refresh();
        let first = remote.get_path(0).unwrap();
        assert_eq!(fs::metadata(&first).unwrap().len(), (DOWNLOAD_CHUNK * 2 + 3) as u64);
        remote.get_path(1).unwrap();
        assert_eq!(remote.clear_cache(), 2);
        assert_eq!(remote.clear_cache(), 0);
    }
}
