use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info};

use crate::{
    backend::{GroupMembership, OwnerBackend},
    error::{Error, Result},
    ids::{OwnerId, OwnerKind},
    memory_db::{NameSlot, Records, Shared, Slot},
    model::{Group, Owner, User},
};

/// Users and groups over the in-memory backend.
///
/// User and group names live in separate namespaces: a user and a group
/// may share a name, two users may not.
pub struct OwnerRegistry {
    shared: Arc<Shared>,
}

impl OwnerRegistry {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

fn committed_owner<'r>(
    records: &'r Records,
    id: &OwnerId,
) -> Result<&'r Owner> {
    records
        .owners
        .get(&id.to_string())
        .and_then(Slot::committed)
        .ok_or_else(|| Error::not_found(owner_label(id.kind()), id))
}

fn owner_label(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::User => "user",
        OwnerKind::Group => "group",
    }
}

fn find_by_name(
    records: &Records,
    kind: OwnerKind,
    name: &str,
) -> Result<Owner> {
    let missing = || Error::not_found(owner_label(kind), name);
    let Some(NameSlot::Committed(id)) = records.names(kind).get(name) else {
        return Err(missing());
    };
    committed_owner(records, id).cloned().map_err(|_| missing())
}

impl OwnerBackend for OwnerRegistry {
    fn reserve(&self, candidate: OwnerId, name: &str) -> Result<OwnerId> {
        let kind = candidate.kind();
        let mut records = self.shared.records.write();
        if records.names(kind).contains_key(name) {
            return Err(Error::NameTaken(name.to_string()));
        }
        let mut id = candidate;
        while records.owners.contains_key(&id.to_string()) {
            id = id.mutate();
        }
        records.owners.insert(id.to_string(), Slot::Reserved);
        records
            .names_mut(kind)
            .insert(name.to_string(), NameSlot::Reserved(id));
        debug!(%kind, owner = name, %id, "reserved owner");
        Ok(id)
    }

    fn insert(&self, owner: &Owner) -> Result<()> {
        owner.check_kind()?;
        let id = owner.id();
        let key = id.to_string();
        let mut records = self.shared.records.write();

        match records.owners.get(&key) {
            None => return Err(Error::IdNotReserved(key)),
            Some(Slot::Committed(_)) => {
                return Err(Error::NameTaken(owner.name().to_string()));
            }
            Some(Slot::Reserved) => {}
        }
        match records.names(owner.kind()).get(owner.name()) {
            None => return Err(Error::IdNotReserved(key)),
            Some(NameSlot::Reserved(holder)) if *holder == id => {}
            Some(_) => return Err(Error::NameTaken(owner.name().to_string())),
        }

        records
            .names_mut(owner.kind())
            .insert(owner.name().to_string(), NameSlot::Committed(id));
        records.owners.insert(key, Slot::Committed(owner.clone()));
        info!(
            kind = %owner.kind(),
            owner = owner.name(),
            %id,
            "created owner"
        );
        Ok(())
    }

    fn get(&self, id: &OwnerId) -> Result<Owner> {
        let records = self.shared.records.read();
        committed_owner(&records, id).cloned()
    }

    fn find_user_name(&self, name: &str) -> Result<User> {
        let records = self.shared.records.read();
        find_by_name(&records, OwnerKind::User, name)?
            .into_user()
            .ok_or_else(|| Error::not_found("user", name))
    }

    fn find_group_name(&self, name: &str) -> Result<Group> {
        let records = self.shared.records.read();
        find_by_name(&records, OwnerKind::Group, name)?
            .into_group()
            .ok_or_else(|| Error::not_found("group", name))
    }

    /// Linear scan over committed groups. An id with no groups, known or
    /// not, yields two empty lists.
    fn get_groups(&self, id: &OwnerId) -> Result<GroupMembership> {
        let records = self.shared.records.read();
        let mut membership = GroupMembership::default();
        for owner in records.owners.values().filter_map(Slot::committed) {
            let Owner::Group(group) = owner else {
                continue;
            };
            if group.owner == *id {
                membership.owned.push(group.clone());
            }
            if group.is_member(id) {
                membership.member.push(group.clone());
            }
        }
        membership.owned.sort_by(|a, b| a.name.cmp(&b.name));
        membership.member.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(membership)
    }

    fn update(&self, owner: &Owner) -> Result<()> {
        owner.check_kind()?;
        let id = owner.id();
        let key = id.to_string();
        let mut records = self.shared.records.write();

        let old_name = committed_owner(&records, &id)?.name().to_string();
        if old_name != owner.name() {
            if records.names(owner.kind()).contains_key(owner.name()) {
                return Err(Error::NameTaken(owner.name().to_string()));
            }
            let names = records.names_mut(owner.kind());
            names.remove(&old_name);
            names.insert(owner.name().to_string(), NameSlot::Committed(id));
            info!(%id, from = %old_name, to = owner.name(), "renamed owner");
        }
        records.owners.insert(key, Slot::Committed(owner.clone()));
        Ok(())
    }

    fn get_space(&self, id: &OwnerId) -> Result<u64> {
        let records = self.shared.records.read();
        committed_owner(&records, id)?;

        let stores: HashSet<String> = records
            .committed_files()
            .filter(|f| f.owner == *id)
            .filter_map(|f| f.id.as_ref())
            .map(|fid| fid.store().to_string())
            .collect();
        Ok(stores
            .iter()
            .filter_map(|key| records.stores.get(key))
            .filter_map(Slot::committed)
            .map(|s| s.file_size)
            .sum())
    }

    fn get_total_space(&self, id: &OwnerId) -> Result<u64> {
        let records = self.shared.records.read();
        let owner = committed_owner(&records, id)?;
        Ok(self.shared.config.quota_for(owner.kind()))
    }
}
