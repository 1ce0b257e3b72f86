//! Mailbox-level commands and selection.

use chrono::{DateTime, FixedOffset};

use super::{CacheScope, Session};
use crate::cache::MailboxKey;
use crate::command::{Command, FetchAttribute, FetchItems, SelectModifier, StatusAttribute};
use crate::connection::state::SessionState;
use crate::connection::stream::Transport;
use crate::extension::Extension;
use crate::parser::{ParseContext, UntaggedResponse};
use crate::types::{
    AclEntry, Flag, IdSet, ListResponse, Mailbox, MailboxStatus, Namespaces, Quota, ResponseCode,
    SelectedMailbox, SequenceSet, UidValidity,
};
use crate::{Error, Result};

/// What APPEND reported through UIDPLUS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendResult {
    /// UIDVALIDITY of the target mailbox.
    pub uid_validity: Option<UidValidity>,
    /// UIDs assigned to the appended message.
    pub uids: IdSet,
}

impl<S: Transport> Session<S> {
    /// Selects `mailbox` read-write.
    pub async fn select(&mut self, mailbox: impl Into<Mailbox>) -> Result<SelectedMailbox> {
        self.open(mailbox.into(), false).await
    }

    /// Selects `mailbox` read-only.
    pub async fn examine(&mut self, mailbox: impl Into<Mailbox>) -> Result<SelectedMailbox> {
        self.open(mailbox.into(), true).await
    }

    async fn open(&mut self, mailbox: Mailbox, read_only: bool) -> Result<SelectedMailbox> {
        let key = self.mailbox_key(&mailbox);
        let modifier = self.select_modifier(key.as_ref());
        let qresync = matches!(modifier, SelectModifier::QResync { .. });
        let command = Command::Select {
            mailbox: mailbox.clone(),
            read_only,
            modifier,
        };
        self.ensure_allowed(&command).await?;

        // Responses to SELECT describe the new mailbox.
        self.state = SessionState::Selected(SelectedMailbox::new(mailbox.clone(), read_only));
        self.scope = None;
        self.uid_index.clear();

        let ctx = match self.run_unchecked(&command).await {
            Ok(ctx) => ctx,
            Err(error) => {
                // A failed SELECT leaves no mailbox selected (RFC 3501 6.3.1).
                if self.state.selected().is_some() {
                    self.state = SessionState::Authenticated;
                }
                return Err(error);
            }
        };

        let Some(selected) = self.state.selected() else {
            return Err(Error::ConnectionLost);
        };
        tracing::info!(
            mailbox = %selected.mailbox,
            exists = selected.exists,
            uid_validity = ?selected.uid_validity,
            read_only = selected.read_only,
            "mailbox selected"
        );

        if let Some(key) = key {
            self.attach_cache(key, qresync, &ctx).await?;
        }
        self.state
            .selected()
            .cloned()
            .ok_or(Error::ConnectionLost)
    }

    fn mailbox_key(&self, mailbox: &Mailbox) -> Option<MailboxKey> {
        self.cache.as_ref()?;
        Some(MailboxKey {
            host: self.config.host.clone(),
            port: self.config.port,
            username: self.username.clone().unwrap_or_default(),
            mailbox: mailbox.as_str().to_string(),
        })
    }

    fn select_modifier(&self, key: Option<&MailboxKey>) -> SelectModifier {
        let qresync_on = self.supports(Extension::QResync)
            && self.enabled.iter().any(|c| c == "QRESYNC");
        if qresync_on
            && let (Some(cache), Some(key)) = (self.cache.as_ref(), key)
            && let Some(meta) = cache.load_meta(key)
            && let Some(mod_seq) = meta.highest_mod_seq
            && let Some(uid_validity) = UidValidity::new(meta.uid_validity)
        {
            return SelectModifier::QResync {
                uid_validity,
                mod_seq,
                known_uids: (!meta.uids.is_empty()).then_some(meta.uids),
            };
        }
        let condstore_on = self
            .enabled
            .iter()
            .any(|c| c == "CONDSTORE" || c == "QRESYNC");
        if self.supports(Extension::CondStore) && !condstore_on {
            SelectModifier::CondStore
        } else {
            SelectModifier::None
        }
    }

    /// Validates the cache against the new selection and brings cached
    /// flags up to date.
    async fn attach_cache(&mut self, key: MailboxKey, qresync: bool, ctx: &ParseContext) -> Result<()> {
        let Some(cache) = self.cache.clone() else {
            return Ok(());
        };
        let Some(validity) = self.state.selected().and_then(|m| m.uid_validity) else {
            tracing::debug!(mailbox = %key.mailbox, "no UIDVALIDITY, cache not used");
            return Ok(());
        };

        let mut meta = cache.sync_validity(&key, validity.get());
        let current = self.current_mod_seq();
        if let (Some(old), Some(new)) = (meta.highest_mod_seq, current)
            && old > new
        {
            tracing::warn!(mailbox = %key.mailbox, old, new, "HIGHESTMODSEQ went backwards, cache invalidated");
            meta = cache.reset(&key, &meta, validity.get());
        }
        let since = match (meta.highest_mod_seq, current) {
            (Some(old), Some(new)) if old < new && !meta.uids.is_empty() => Some(old),
            _ => None,
        };
        self.scope = Some(CacheScope { key, meta });

        if qresync {
            // The server already sent the changes with the SELECT response.
            for response in ctx.responses() {
                match response {
                    UntaggedResponse::Fetch { seq, items } => self.note_fetch(*seq, items),
                    UntaggedResponse::Vanished { uids, .. } => {
                        self.with_scope(|cache, key, meta| cache.remove(key, meta, uids));
                    }
                    _ => {}
                }
            }
        } else if let Some(since) = since {
            self.sync_flags(since).await?;
        }

        if current.is_some() {
            self.with_scope(|cache, key, meta| cache.set_highest_mod_seq(key, meta, current));
        }
        Ok(())
    }

    /// Fetches the flags that changed since `since`. The responses update
    /// the cache as they arrive.
    async fn sync_flags(&mut self, since: u64) -> Result<()> {
        let vanished = self.enabled.iter().any(|c| c == "QRESYNC");
        let command = Command::Fetch {
            sequence: SequenceSet::all(),
            items: FetchItems::Items(vec![FetchAttribute::Flags]),
            uid: true,
            changed_since: Some(since),
            vanished,
        };
        let ctx = self.run(&command).await?;
        tracing::debug!(since, changed = ctx.fetches().len(), "cached flags resynchronized");
        Ok(())
    }

    fn deselect(&mut self) {
        if self.state.selected().is_some() {
            self.state = SessionState::Authenticated;
        }
        self.scope = None;
        self.uid_index.clear();
    }

    /// Closes the mailbox, expunging deleted messages.
    pub async fn close(&mut self) -> Result<()> {
        self.run(&Command::Close).await?;
        self.deselect();
        Ok(())
    }

    /// Closes the mailbox without expunging (RFC 3691).
    pub async fn unselect(&mut self) -> Result<()> {
        self.run(&Command::Unselect).await?;
        self.deselect();
        Ok(())
    }

    /// UNSELECT when available, otherwise CLOSE. CLOSE expunges.
    pub async fn unselect_or_close(&mut self) -> Result<()> {
        if self.supports(Extension::Unselect) {
            self.unselect().await
        } else {
            self.close().await
        }
    }

    /// Creates a mailbox.
    pub async fn create(&mut self, mailbox: impl Into<Mailbox>) -> Result<()> {
        self.run(&Command::Create {
            mailbox: mailbox.into(),
        })
        .await?;
        Ok(())
    }

    /// Deletes a mailbox.
    pub async fn delete(&mut self, mailbox: impl Into<Mailbox>) -> Result<()> {
        self.run(&Command::Delete {
            mailbox: mailbox.into(),
        })
        .await?;
        Ok(())
    }

    /// Renames a mailbox.
    pub async fn rename(&mut self, from: impl Into<Mailbox>, to: impl Into<Mailbox>) -> Result<()> {
        self.run(&Command::Rename {
            from: from.into(),
            to: to.into(),
        })
        .await?;
        Ok(())
    }

    /// Subscribes to a mailbox.
    pub async fn subscribe(&mut self, mailbox: impl Into<Mailbox>) -> Result<()> {
        self.run(&Command::Subscribe {
            mailbox: mailbox.into(),
        })
        .await?;
        Ok(())
    }

    /// Unsubscribes from a mailbox.
    pub async fn unsubscribe(&mut self, mailbox: impl Into<Mailbox>) -> Result<()> {
        self.run(&Command::Unsubscribe {
            mailbox: mailbox.into(),
        })
        .await?;
        Ok(())
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        let ctx = self
            .run(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(ctx
            .into_responses()
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::List(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Lists subscribed mailboxes.
    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        let ctx = self
            .run(&Command::Lsub {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(ctx
            .into_responses()
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Lsub(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Requests STATUS of a mailbox other than the selected one.
    pub async fn status(
        &mut self,
        mailbox: impl Into<Mailbox>,
        items: &[StatusAttribute],
    ) -> Result<MailboxStatus> {
        if items.contains(&StatusAttribute::HighestModSeq) {
            self.extensions.require(Extension::CondStore)?;
        }
        let ctx = self
            .run(&Command::Status {
                mailbox: mailbox.into(),
                items: items.to_vec(),
            })
            .await?;
        ctx.into_responses()
            .into_iter()
            .find_map(|r| match r {
                UntaggedResponse::Status(status) => Some(status),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("STATUS without status data".to_string()))
    }

    /// Requests the namespaces (RFC 2342).
    pub async fn namespace(&mut self) -> Result<Namespaces> {
        let ctx = self.run(&Command::Namespace).await?;
        Ok(ctx
            .into_responses()
            .into_iter()
            .find_map(|r| match r {
                UntaggedResponse::Namespace(ns) => Some(ns),
                _ => None,
            })
            .unwrap_or_default())
    }

    /// Reads a quota root (RFC 2087).
    pub async fn get_quota(&mut self, root: &str) -> Result<Vec<Quota>> {
        let ctx = self
            .run(&Command::GetQuota {
                root: root.to_string(),
            })
            .await?;
        Ok(quotas(ctx))
    }

    /// Lists the quota roots of a mailbox with their quotas.
    pub async fn get_quota_root(
        &mut self,
        mailbox: impl Into<Mailbox>,
    ) -> Result<(Vec<String>, Vec<Quota>)> {
        let ctx = self
            .run(&Command::GetQuotaRoot {
                mailbox: mailbox.into(),
            })
            .await?;
        let roots = ctx
            .responses()
            .iter()
            .filter_map(|r| match r {
                UntaggedResponse::QuotaRoot { roots, .. } => Some(roots.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        Ok((roots, quotas(ctx)))
    }

    /// Reads a mailbox ACL (RFC 4314).
    pub async fn get_acl(&mut self, mailbox: impl Into<Mailbox>) -> Result<Vec<AclEntry>> {
        let ctx = self
            .run(&Command::GetAcl {
                mailbox: mailbox.into(),
            })
            .await?;
        Ok(ctx
            .into_responses()
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Acl { entries, .. } => Some(entries),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Reads the current user's rights on a mailbox.
    pub async fn my_rights(&mut self, mailbox: impl Into<Mailbox>) -> Result<String> {
        let ctx = self
            .run(&Command::MyRights {
                mailbox: mailbox.into(),
            })
            .await?;
        ctx.into_responses()
            .into_iter()
            .find_map(|r| match r {
                UntaggedResponse::MyRights { rights, .. } => Some(rights),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("MYRIGHTS without rights".to_string()))
    }

    /// Appends a message to `mailbox`.
    pub async fn append(
        &mut self,
        mailbox: impl Into<Mailbox>,
        message: &[u8],
        flags: &[Flag],
        date: Option<DateTime<FixedOffset>>,
    ) -> Result<AppendResult> {
        let command = Command::Append {
            mailbox: mailbox.into(),
            flags: flags.to_vec(),
            date,
            message: message.to_vec(),
        };
        let ctx = self.run(&command).await?;
        let mut result = AppendResult::default();
        if let Some(ResponseCode::AppendUid { uid_validity, uids }) =
            ctx.completion().and_then(|c| c.code.clone())
        {
            result.uid_validity = Some(uid_validity);
            result.uids = uids;
        }
        tracing::debug!(uids = %result.uids, "message appended");
        Ok(result)
    }
}

fn quotas(ctx: ParseContext) -> Vec<Quota> {
    ctx.into_responses()
        .into_iter()
        .filter_map(|r| match r {
            UntaggedResponse::Quota(quota) => Some(quota),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;
    use crate::connection::config::Config;

    fn config() -> Config {
        Config::builder("imap.example.com")
            .io_timeout(Duration::from_secs(5))
            .build()
    }

    #[tokio::test]
    async fn test_select_records_mailbox_data() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0000 EXAMINE INBOX\r\n")
            .read(b"* 172 EXISTS\r\n* 1 RECENT\r\n")
            .read(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .read(b"* OK [UIDNEXT 4392] Predicted next UID\r\n")
            .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
            .read(b"A0000 OK [READ-ONLY] EXAMINE completed\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let selected = session.examine("INBOX").await.unwrap();
        assert_eq!(selected.exists, 172);
        assert_eq!(selected.recent, 1);
        assert_eq!(selected.uid_validity.map(UidValidity::get), Some(3857529045));
        assert!(selected.read_only);
        assert_eq!(selected.flags.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_select_leaves_authenticated() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0000 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\n* OK [UIDVALIDITY 7] ok\r\nA0000 OK [READ-WRITE] done\r\n")
            .write(b"A0001 SELECT Missing\r\n")
            .read(b"A0001 NO [TRYCREATE] no such mailbox\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let error = session.select("Missing").await.unwrap_err();
        assert!(matches!(
            error.response_code(),
            Some(ResponseCode::TryCreate)
        ));
        assert_eq!(session.state(), &SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_unselect_requires_extension() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0000 SELECT INBOX\r\n")
            .read(b"A0000 OK [READ-WRITE] done\r\n")
            .write(b"A0001 CLOSE\r\n")
            .read(b"A0001 OK closed\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        assert!(matches!(
            session.unselect().await,
            Err(Error::CapabilityMissing(name)) if name == "UNSELECT"
        ));
        session.unselect_or_close().await.unwrap();
        assert_eq!(session.state(), &SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_append_reports_appenduid() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 UIDPLUS LITERAL+] hi\r\n")
            .write(b"A0000 APPEND Drafts (\\Draft) {5+}\r\nhello\r\n")
            .read(b"A0000 OK [APPENDUID 38505 3955] APPEND completed\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let result = session
            .append("Drafts", b"hello", &[Flag::Draft], None)
            .await
            .unwrap();
        assert_eq!(result.uid_validity.map(UidValidity::get), Some(38505));
        assert!(result.uids.contains(3955));
    }

    #[tokio::test]
    async fn test_synchronizing_literal_refused() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0000 APPEND Drafts {5}\r\n")
            .read(b"A0000 NO [OVERQUOTA] mailbox full\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session.append("Drafts", b"hello", &[], None).await.unwrap_err();
        assert!(matches!(error, Error::No { .. }));
    }

    #[tokio::test]
    async fn test_status_and_list() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0000 STATUS blurdybloop (MESSAGES UIDNEXT)\r\n")
            .read(b"* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\nA0000 OK done\r\n")
            .write(b"A0001 LIST \"\" *\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n* LIST (\\Noselect) \"/\" foo\r\nA0001 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let status = session
            .status("blurdybloop", &[StatusAttribute::Messages, StatusAttribute::UidNext])
            .await
            .unwrap();
        assert_eq!(status.messages, Some(231));
        assert_eq!(status.uid_next, Some(44292));

        let list = session.list("", "*").await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].delimiter, Some('/'));
    }

    #[tokio::test]
    async fn test_status_highestmodseq_needs_condstore() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session
            .status("INBOX", &[StatusAttribute::HighestModSeq])
            .await
            .unwrap_err();
        assert!(matches!(error, Error::CapabilityMissing(_)));
    }
}
