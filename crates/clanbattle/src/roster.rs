use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{DayKey, GroupId, MemberId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Member,
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::SuperAdmin, Role::Admin, Role::Member];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super_admin" | "superadmin" | "owner" => Some(Role::SuperAdmin),
            "admin" | "officer" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPreference {
    /// Lap reservations fire once and are removed.
    #[default]
    Once,
    /// Lap reservations move on to the next lap after firing.
    Repeat,
}

impl NotifyPreference {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" | "1" => Some(NotifyPreference::Once),
            "repeat" | "always" | "2" => Some(NotifyPreference::Repeat),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub member_id: MemberId,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub notify: NotifyPreference,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub role: Role,
    /// Game day the member last spent their save-slot reload.
    #[serde(default)]
    pub last_save_slot: Option<DayKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum RosterEvent {
    UserNickname {
        member_id: MemberId,
        nickname: Option<String>,
    },
    UserNotify {
        member_id: MemberId,
        notify: NotifyPreference,
    },
    MemberSet {
        group_id: GroupId,
        member_id: MemberId,
        role: Option<Role>, // None means remove.
    },
    SaveSlotSet {
        group_id: GroupId,
        member_id: MemberId,
        day: Option<DayKey>,
    },
}

/// Users and clan memberships.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    users: HashMap<MemberId, User>,
    members: HashMap<GroupId, BTreeMap<MemberId, Membership>>,
    super_admins: HashSet<MemberId>,
}

impl Roster {
    pub fn new(super_admins: impl IntoIterator<Item = MemberId>) -> Self {
        Self {
            super_admins: super_admins.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn apply(&mut self, e: &RosterEvent) {
        match e {
            RosterEvent::UserNickname {
                member_id,
                nickname,
            } => {
                let u = self.user_entry(*member_id);
                u.nickname = nickname
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            RosterEvent::UserNotify { member_id, notify } => {
                self.user_entry(*member_id).notify = *notify;
            }
            RosterEvent::MemberSet {
                group_id,
                member_id,
                role,
            } => match role {
                Some(r) => {
                    self.user_entry(*member_id);
                    let g = self.members.entry(*group_id).or_default();
                    g.entry(*member_id)
                        .and_modify(|m| m.role = *r)
                        .or_insert(Membership {
                            group_id: *group_id,
                            member_id: *member_id,
                            role: *r,
                            last_save_slot: None,
                        });
                }
                None => {
                    if let Some(g) = self.members.get_mut(group_id) {
                        g.remove(member_id);
                    }
                }
            },
            RosterEvent::SaveSlotSet {
                group_id,
                member_id,
                day,
            } => {
                let Some(m) = self
                    .members
                    .get_mut(group_id)
                    .and_then(|g| g.get_mut(member_id))
                else {
                    return;
                };
                m.last_save_slot = *day;
            }
        }
    }

    fn user_entry(&mut self, member_id: MemberId) -> &mut User {
        self.users.entry(member_id).or_insert_with(|| User {
            member_id,
            ..User::default()
        })
    }

    pub fn user(&self, member_id: MemberId) -> Option<&User> {
        self.users.get(&member_id)
    }

    /// Display name; falls back to the id.
    pub fn nickname(&self, member_id: MemberId) -> String {
        self.users
            .get(&member_id)
            .and_then(|u| u.nickname.clone())
            .unwrap_or_else(|| member_id.to_string())
    }

    pub fn notify_preference(&self, member_id: MemberId) -> Option<NotifyPreference> {
        self.users.get(&member_id).map(|u| u.notify)
    }

    pub fn membership(&self, group_id: GroupId, member_id: MemberId) -> Option<&Membership> {
        self.members.get(&group_id)?.get(&member_id)
    }

    pub fn is_member(&self, group_id: GroupId, member_id: MemberId) -> bool {
        self.membership(group_id, member_id).is_some()
    }

    /// Effective role; configured super admins outrank any stored role and
    /// need no membership.
    pub fn role_of(&self, group_id: GroupId, member_id: MemberId) -> Option<Role> {
        if self.super_admins.contains(&member_id) {
            return Some(Role::SuperAdmin);
        }
        self.membership(group_id, member_id).map(|m| m.role)
    }

    pub fn is_elevated(&self, group_id: GroupId, member_id: MemberId) -> bool {
        self.role_of(group_id, member_id)
            .is_some_and(Role::is_elevated)
    }

    pub fn members(&self, group_id: GroupId) -> impl Iterator<Item = &Membership> + '_ {
        self.members.get(&group_id).into_iter().flat_map(|g| g.values())
    }
}
