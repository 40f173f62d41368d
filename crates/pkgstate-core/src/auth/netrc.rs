//! netrc-style credential files.
//!
//! ```text
//! machine example.com login mona password s3cret
//! machine api.example.com
//!     login ci
//!     password token
//! default login anonymous password guest
//! ```
//!
//! Entries may span lines. Unknown tokens and incomplete entries are skipped;
//! a host listed more than once resolves to its last complete entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{AuthorizationProvider, Credential, ProviderDescriptor, ProviderKind};
use crate::errors::{PkgStateError, PkgStateResult};
use crate::fs::{FileSystem, SharedFileSystem};

const KEYWORDS: &[&str] = &["machine", "default", "login", "password", "account", "macdef"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialEntry {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl CredentialEntry {
    pub fn credential(&self) -> Credential {
        Credential::new(&self.user, &self.password)
    }

    fn to_line(&self) -> String {
        format!(
            "machine {} login {} password {}",
            self.host, self.user, self.password
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Netrc {
    machines: BTreeMap<String, CredentialEntry>,
    default: Option<CredentialEntry>,
}

#[derive(Default)]
struct PartialEntry {
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

impl Netrc {
    pub fn parse(text: &str) -> Self {
        let tokens = tokenize(text);
        let mut netrc = Netrc::default();
        let mut current: Option<PartialEntry> = None;
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            match token {
                "machine" => {
                    netrc.finish(current.take());
                    match iter.next_if(|t| !is_keyword(t)) {
                        Some(host) => {
                            current = Some(PartialEntry {
                                host: Some(host.to_string()),
                                ..PartialEntry::default()
                            })
                        }
                        None => debug!("netrc: 'machine' without a host, skipping"),
                    }
                }
                "default" => {
                    netrc.finish(current.take());
                    current = Some(PartialEntry::default());
                }
                "login" | "password" | "account" => {
                    let value = iter.next_if(|t| !is_keyword(t));
                    if let (Some(entry), Some(value)) = (current.as_mut(), value) {
                        match token {
                            "login" => entry.user = Some(value.to_string()),
                            "password" => entry.password = Some(value.to_string()),
                            _ => {}
                        }
                    }
                }
                other => debug!("netrc: ignoring unexpected token '{other}'"),
            }
        }
        netrc.finish(current);
        netrc
    }

    fn finish(&mut self, entry: Option<PartialEntry>) {
        let Some(entry) = entry else { return };
        let (Some(user), Some(password)) = (entry.user, entry.password) else {
            debug!(
                "netrc: incomplete entry for {}, skipping",
                entry.host.as_deref().unwrap_or("default")
            );
            return;
        };
        match entry.host {
            Some(host) => {
                self.machines.insert(
                    host.to_lowercase(),
                    CredentialEntry {
                        host,
                        user,
                        password,
                    },
                );
            }
            None => {
                self.default = Some(CredentialEntry {
                    host: "default".to_string(),
                    user,
                    password,
                })
            }
        }
    }

    /// Entry for `host`, falling back to the `default` entry.
    pub fn lookup(&self, host: &str) -> Option<&CredentialEntry> {
        self.machines
            .get(&host.to_lowercase())
            .or(self.default.as_ref())
    }

    /// Machine entries keyed by lowercased host, without the default entry.
    pub fn machines(&self) -> &BTreeMap<String, CredentialEntry> {
        &self.machines
    }

    pub fn default_entry(&self) -> Option<&CredentialEntry> {
        self.default.as_ref()
    }

    pub fn len(&self) -> usize {
        self.machines.len() + usize::from(self.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per entry, hosts sorted, `default` last.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.machines.values() {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        if let Some(default) = &self.default {
            out.push_str(&format!(
                "default login {} password {}\n",
                default.user, default.password
            ));
        }
        out
    }
}

fn is_keyword(token: &str) -> bool {
    KEYWORDS.contains(&token)
}

/// Split netrc text into tokens, dropping `#` comments and `macdef` bodies.
/// A `#` only starts a comment where a keyword is expected.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut in_macdef = false;
    let mut expects_value = false;
    for line in text.lines() {
        if in_macdef {
            if line.trim().is_empty() {
                in_macdef = false;
            }
            continue;
        }
        for token in line.split_whitespace() {
            if std::mem::take(&mut expects_value) && !is_keyword(token) {
                tokens.push(token);
                continue;
            }
            if token.starts_with('#') {
                break;
            }
            if token == "macdef" {
                // The macro body runs until the next blank line.
                in_macdef = true;
                break;
            }
            expects_value = matches!(token, "machine" | "login" | "password" | "account");
            tokens.push(token);
        }
    }
    tokens
}

// ---------------------------------------------------------------------------
// NetrcProvider
// ---------------------------------------------------------------------------

/// Credential provider backed by a netrc file.
pub struct NetrcProvider {
    fs: SharedFileSystem,
    path: PathBuf,
    kind: ProviderKind,
    netrc: Netrc,
}

impl NetrcProvider {
    /// Provider for an explicitly configured file; the file must exist.
    pub fn custom(fs: SharedFileSystem, path: impl Into<PathBuf>) -> PkgStateResult<Self> {
        let path = path.into();
        if !fs.exists(&path) {
            return Err(PkgStateError::FileNotFound(path));
        }
        let content = fs.read_to_string(&path)?;
        let netrc = Netrc::parse(&content);
        debug!(path = %path.display(), entries = netrc.len(), "loaded custom netrc");
        Ok(Self {
            fs,
            path,
            kind: ProviderKind::CustomNetrc,
            netrc,
        })
    }

    /// Provider for the conventional per-user file. A missing or unreadable
    /// file yields an empty provider.
    pub fn user(fs: SharedFileSystem, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let netrc = match fs.read_optional(&path) {
            Ok(Some(content)) => Netrc::parse(&content),
            Ok(None) => Netrc::default(),
            Err(e) => {
                warn!("ignoring unreadable netrc file {}: {e}", path.display());
                Netrc::default()
            }
        };
        Self {
            fs,
            path,
            kind: ProviderKind::UserNetrc,
            netrc,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn netrc(&self) -> &Netrc {
        &self.netrc
    }

    /// Record a credential for `host` in the backing file, creating it if
    /// needed. Existing content is kept; the new entry is appended and wins
    /// over earlier entries for the same host.
    pub fn add_or_update(
        &mut self,
        host: &str,
        user: &str,
        password: &str,
    ) -> PkgStateResult<()> {
        let entry = CredentialEntry {
            host: host.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        };
        if let Some(existing) = self.netrc.machines.get(&host.to_lowercase()) {
            if existing.user == entry.user && existing.password == entry.password {
                return Ok(());
            }
        }

        let mut content = self.fs.read_optional(&self.path)?.unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&entry.to_line());
        content.push('\n');

        self.fs.write_atomic(&self.path, content.as_bytes())?;
        self.netrc = Netrc::parse(&content);
        debug!(path = %self.path.display(), host, "stored netrc credential");
        Ok(())
    }

    /// Drop the entry for `host` and rewrite the file in canonical form.
    /// Returns `false` when there was nothing to remove.
    pub fn remove(&mut self, host: &str) -> PkgStateResult<bool> {
        let mut netrc = self.netrc.clone();
        if netrc.machines.remove(&host.to_lowercase()).is_none() {
            return Ok(false);
        }
        self.fs.write_atomic(&self.path, netrc.render().as_bytes())?;
        self.netrc = netrc;
        debug!(path = %self.path.display(), host, "removed netrc credential");
        Ok(true)
    }
}

impl AuthorizationProvider for NetrcProvider {
    fn authentication(&self, host: &str) -> Option<Credential> {
        self.netrc.lookup(host).map(CredentialEntry::credential)
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: self.kind,
            source: Some(self.path.clone()),
            entries: Some(self.netrc.len()),
        }
    }

    fn as_netrc_mut(&mut self) -> Option<&mut NetrcProvider> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fs::{FileSystem, InMemoryFileSystem, LocalFileSystem};

    #[test]
    fn parse_single_line_entries() {
        let netrc = Netrc::parse(
            "machine example.com login anonymous password qwerty\n\
             machine example.org login mona password hunter2\n",
        );
        assert_eq!(netrc.len(), 2);
        let entry = netrc.lookup("example.com").unwrap();
        assert_eq!(entry.user, "anonymous");
        assert_eq!(entry.password, "qwerty");
        assert_eq!(netrc.lookup("example.org").unwrap().user, "mona");
        assert!(netrc.lookup("example.net").is_none());
    }

    #[test]
    fn parse_multi_line_entry() {
        let netrc = Netrc::parse("machine example.com\n  login mona\n  password s3cret\n");
        let entry = netrc.lookup("example.com").unwrap();
        assert_eq!(entry.user, "mona");
        assert_eq!(entry.password, "s3cret");
    }

    #[test]
    fn last_entry_for_host_wins() {
        let netrc = Netrc::parse(
            "machine example.com login first password one\n\
             machine example.com login second password two\n",
        );
        assert_eq!(netrc.len(), 1);
        assert_eq!(netrc.lookup("example.com").unwrap().user, "second");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let netrc = Netrc::parse(
            "password orphan\n\
             this is not netrc\n\
             machine broken.com login onlylogin\n\
             machine\n\
             machine ok.com login mona password pw\n",
        );
        assert!(netrc.lookup("broken.com").is_none());
        assert_eq!(netrc.lookup("ok.com").unwrap().password, "pw");
        assert_eq!(netrc.len(), 1);
    }

    #[test]
    fn missing_value_does_not_swallow_next_keyword() {
        let netrc = Netrc::parse(
            "machine a.com login password pw\nmachine b.com login u password p\n",
        );
        assert!(netrc.lookup("a.com").is_none());
        assert_eq!(netrc.lookup("b.com").unwrap().user, "u");
    }

    #[test]
    fn comments_and_macdef_are_ignored() {
        let netrc = Netrc::parse(
            "# personal credentials\n\
             machine a.com login u password p # trailing comment\n\
             macdef init\n\
             machine evil.com login x password y\n\
             \n\
             machine b.com login v password q\n",
        );
        assert_eq!(netrc.lookup("a.com").unwrap().password, "p");
        assert!(netrc.lookup("evil.com").is_none());
        assert_eq!(netrc.lookup("b.com").unwrap().user, "v");
    }

    #[test]
    fn values_may_start_with_a_hash() {
        let netrc = Netrc::parse(
            "machine a.com login u password #s3cret # note
             machine b.com
  login #ops
  password
  #multi
",
        );
        assert_eq!(netrc.lookup("a.com").unwrap().password, "#s3cret");
        let b = netrc.lookup("b.com").unwrap();
        assert_eq!(b.user, "#ops");
        assert_eq!(b.password, "#multi");
        assert_eq!(netrc.len(), 2);
    }

    #[test]
    fn default_entry_is_a_fallback() {
        let netrc = Netrc::parse(
            "machine a.com login u password p\ndefault login anonymous password guest\n",
        );
        assert_eq!(netrc.lookup("a.com").unwrap().user, "u");
        assert_eq!(netrc.lookup("unknown.com").unwrap().user, "anonymous");
        assert_eq!(netrc.default_entry().unwrap().host, "default");
        assert_eq!(netrc.len(), 2);
    }

    #[test]
    fn host_lookup_ignores_case() {
        let netrc = Netrc::parse("machine GitHub.com login mona password pw\n");
        assert_eq!(netrc.lookup("github.com").unwrap().host, "GitHub.com");
    }

    #[test]
    fn custom_file_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.netrc");
        let fs: SharedFileSystem = Arc::new(LocalFileSystem);

        let err = NetrcProvider::custom(fs.clone(), &path).err().unwrap();
        assert!(matches!(&err, PkgStateError::FileNotFound(p) if p == &path));
        assert!(err.to_string().contains(&path.display().to_string()));

        std::fs::write(&path, "machine h login u password p\n").unwrap();
        let provider = NetrcProvider::custom(fs, &path).unwrap();
        assert_eq!(provider.authentication("h"), Some(Credential::new("u", "p")));
        assert_eq!(provider.descriptor().kind, ProviderKind::CustomNetrc);
    }

    #[test]
    fn user_file_may_be_absent() {
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new());
        let provider = NetrcProvider::user(fs, "/home/me/.netrc");
        assert!(provider.netrc().is_empty());
        let descriptor = provider.descriptor();
        assert_eq!(descriptor.kind, ProviderKind::UserNetrc);
        assert_eq!(descriptor.entries, Some(0));
        assert_eq!(descriptor.source, Some(PathBuf::from("/home/me/.netrc")));
    }

    #[test]
    fn add_or_update_creates_and_appends() {
        let memory = Arc::new(InMemoryFileSystem::new());
        let fs: SharedFileSystem = memory.clone();
        let path = Path::new("/home/me/.netrc");
        let mut provider = NetrcProvider::user(fs.clone(), path);

        provider.add_or_update("registry.example.com", "mona", "one").unwrap();
        assert_eq!(
            fs.read_to_string(path).unwrap(),
            "machine registry.example.com login mona password one\n"
        );

        provider.add_or_update("registry.example.com", "mona", "two").unwrap();
        assert_eq!(
            provider.authentication("registry.example.com"),
            Some(Credential::new("mona", "two"))
        );

        // Unchanged credential leaves the file alone.
        let before = memory.read_bytes(path).unwrap();
        provider.add_or_update("registry.example.com", "mona", "two").unwrap();
        assert_eq!(memory.read_bytes(path).unwrap(), before);

        // A fresh provider sees the persisted state.
        let reloaded = NetrcProvider::user(fs, path);
        assert_eq!(reloaded.netrc().lookup("registry.example.com").unwrap().password, "two");
    }

    #[test]
    fn add_or_update_preserves_existing_content() {
        let fs: SharedFileSystem = Arc::new(
            InMemoryFileSystem::new().with_file("/n", "# mine\nmachine a.com login u password p"),
        );
        let mut provider = NetrcProvider::custom(fs.clone(), "/n").unwrap();
        provider.add_or_update("b.com", "v", "q").unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("/n")).unwrap(),
            "# mine\nmachine a.com login u password p\nmachine b.com login v password q\n"
        );
    }

    #[test]
    fn render_sorts_hosts_and_puts_default_last() {
        let netrc = Netrc::parse(
            "default login anon password guest\n\
             machine z.com login z password 1\n\
             machine a.com login a password 2\n",
        );
        assert_eq!(
            netrc.render(),
            "machine a.com login a password 2\n\
             machine z.com login z password 1\n\
             default login anon password guest\n"
        );
        assert_eq!(Netrc::parse(&netrc.render()), netrc);
    }

    #[test]
    fn remove_rewrites_file() {
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new().with_file(
            "/n",
            "machine a.com login u password p\nmachine b.com login v password q\n",
        ));
        let mut provider = NetrcProvider::custom(fs.clone(), "/n").unwrap();

        assert!(!provider.remove("missing.com").unwrap());
        assert!(provider.remove("A.com").unwrap());
        assert!(provider.authentication("a.com").is_none());
        assert_eq!(
            fs.read_to_string(Path::new("/n")).unwrap(),
            "machine b.com login v password q\n"
        );
    }
}
