use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use almanac_collections::error::{Error, Result};
use almanac_collections::types::*;
use almanac_collections::{NotificationSupport, SharingSupport};

use crate::namespace::{lock, parse_resource_uri, resource_uri, Handle};
use crate::store::ReferenceStore;
use crate::timestamp::now_msec;
use crate::unique_ident::gen_ident;

pub(crate) type Mailboxes = BTreeMap<String, Vec<Notification>>;

/// Notifications waiting for each principal, oldest first
#[derive(Default)]
pub(crate) struct NotificationNs(Mutex<Mailboxes>);

impl NotificationNs {
    pub(crate) fn restore(mailboxes: Mailboxes) -> Self {
        Self(Mutex::new(mailboxes))
    }

    pub(crate) fn checkpoint(&self) -> Mailboxes {
        lock(&self.0).clone()
    }

    fn push(&self, principal_uri: &str, kind: NotificationKind) -> String {
        let id = gen_ident().to_string();
        let created = now_msec();
        let notification = Notification {
            etag: Etag::from_data(format!("{}-{}", id, created).as_bytes()),
            id: id.clone(),
            principal_uri: principal_uri.to_string(),
            created,
            kind,
        };
        lock(&self.0)
            .entry(principal_uri.to_string())
            .or_default()
            .push(notification);
        id
    }
}

/// Outcome of an invite update, applied to instances and mailboxes once
/// the calendar lock is released
#[derive(Default)]
struct InviteDelta {
    added: Vec<ShareInvite>,
    updated: Vec<ShareInvite>,
    removed: Vec<ShareInvite>,
}

fn merge_invites(current: &mut Vec<ShareInvite>, owner: &str, invites: Vec<ShareInvite>) -> InviteDelta {
    let mut delta = InviteDelta::default();
    for mut invite in invites {
        if invite.principal.as_deref() == Some(owner) {
            continue;
        }
        if invite.principal.is_none() {
            invite.invite_status = InviteStatus::Invalid;
        }

        let pos = current.iter().position(|i| i.href == invite.href);
        match (invite.access, pos) {
            (ShareAccess::NoAccess, Some(pos)) => delta.removed.push(current.remove(pos)),
            (ShareAccess::NoAccess, None) => (),
            (_, Some(pos)) => {
                let known = &mut current[pos];
                known.access = invite.access;
                known.display_name = invite.display_name;
                if invite.principal.is_none() {
                    known.invite_status = InviteStatus::Invalid;
                } else if known.principal != invite.principal {
                    known.principal = invite.principal;
                    known.invite_status = InviteStatus::NoResponse;
                }
                delta.updated.push(known.clone());
            }
            (_, None) => {
                current.push(invite.clone());
                delta.added.push(invite);
            }
        }
    }
    delta
}

impl ReferenceStore {
    /// Sharing is managed through the owner's instance only
    fn open_owned(&self, id: &CalendarId) -> Result<Handle> {
        let handle = self.calendars.open(id)?;
        if !handle.instance.is_owner() {
            return Err(Error::NotFound(format!(
                "calendar {} is not owned by {}",
                id, handle.instance.principal_uri
            )));
        }
        Ok(handle)
    }
}

#[async_trait]
impl SharingSupport for ReferenceStore {
    async fn update_invites(&self, id: &CalendarId, invites: Vec<ShareInvite>) -> Result<()> {
        let handle = self.open_owned(id)?;

        let owner = handle.instance.principal_uri.clone();
        let calendar = handle.calendar.id;
        let delta = handle
            .calendar
            .with_invites(|current| merge_invites(current, &owner, invites))
            .await?;

        for invite in delta.removed {
            if let Some(principal) = &invite.principal {
                self.calendars.detach(calendar, principal);
            }
            tracing::debug!(calendar=%id, href=%invite.href, "share withdrawn");
        }
        for invite in delta.updated {
            if let Some(principal) = &invite.principal {
                self.calendars.set_access(calendar, principal, invite.access);
            }
        }
        for invite in delta.added {
            let principal = match &invite.principal {
                Some(p) => p,
                None => {
                    tracing::warn!(calendar=%id, href=%invite.href, "invite to an unknown principal");
                    continue;
                }
            };
            let props = &handle.instance.properties;
            self.notifications.push(
                principal,
                NotificationKind::ShareInvite {
                    sharer: owner.clone(),
                    resource_uri: resource_uri(calendar),
                    calendar_uri: handle.instance.uri.clone(),
                    access: invite.access,
                    invite_status: invite.invite_status,
                    display_name: props.display_name.clone(),
                    supported_components: props
                        .supported_components
                        .iter()
                        .map(|c| c.to_string())
                        .collect(),
                },
            );
            tracing::debug!(calendar=%id, href=%invite.href, access=?invite.access, "calendar shared");
        }
        Ok(())
    }

    async fn get_invites(&self, id: &CalendarId) -> Result<Vec<ShareInvite>> {
        let handle = self.calendars.open(id)?;
        Ok(handle.calendar.invites().await)
    }

    async fn set_publish_status(&self, id: &CalendarId, published: bool) -> Result<()> {
        let handle = self.open_owned(id)?;
        handle.calendar.set_published(published).await?;
        tracing::debug!(calendar=%id, published=published, "publish status changed");
        Ok(())
    }
}

#[async_trait]
impl NotificationSupport for ReferenceStore {
    async fn get_notifications_for_principal(
        &self,
        principal_uri: &str,
    ) -> Result<Vec<Notification>> {
        Ok(lock(&self.notifications.0)
            .get(principal_uri)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_notification(&self, principal_uri: &str, notification_id: &str) -> Result<()> {
        let mut mailboxes = lock(&self.notifications.0);
        let mailbox = mailboxes
            .get_mut(principal_uri)
            .ok_or_else(|| Error::NotFound(notification_id.to_string()))?;
        let pos = mailbox
            .iter()
            .position(|n| n.id == notification_id)
            .ok_or_else(|| Error::NotFound(notification_id.to_string()))?;
        mailbox.remove(pos);
        Ok(())
    }

    async fn share_reply(
        &self,
        href: &str,
        status: InviteStatus,
        calendar_uri: &str,
        in_reply_to: &str,
        summary: Option<&str>,
    ) -> Result<Option<String>> {
        let calendar_id = parse_resource_uri(calendar_uri)
            .ok_or_else(|| Error::NotFound(calendar_uri.to_string()))?;
        let calendar = self
            .calendars
            .calendar(calendar_id)
            .ok_or_else(|| Error::NotFound(calendar_uri.to_string()))?;

        let invite = calendar
            .with_invites(|invites| {
                let invite = invites.iter_mut().find(|i| i.href == href)?;
                if invite.invite_status != InviteStatus::Invalid {
                    invite.invite_status = status;
                }
                Some(invite.clone())
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("invite for {}", href)))?;

        let sharee = invite
            .principal
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("principal for {}", href)))?;

        let instance = match status {
            InviteStatus::Accepted => Some(self.calendars.attach(calendar_id, sharee, invite.access)?),
            InviteStatus::Declined => {
                self.calendars.detach(calendar_id, sharee);
                None
            }
            InviteStatus::NoResponse | InviteStatus::Invalid => None,
        };

        let owner = self
            .calendars
            .instances_of(calendar_id)
            .into_iter()
            .find(|h| h.instance.is_owner())
            .map(|h| h.instance.principal_uri);
        if let Some(owner) = owner {
            self.notifications.push(
                &owner,
                NotificationKind::InviteReply {
                    sharee: href.to_string(),
                    resource_uri: calendar_uri.to_string(),
                    in_reply_to: in_reply_to.to_string(),
                    status,
                    summary: summary.map(str::to_string),
                },
            );
        }

        tracing::info!(resource=%calendar_uri, href=%href, status=?status, instance=?instance, "share reply");
        Ok(instance)
    }
}
