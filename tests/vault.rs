use docvault::{
    Config,
    Error,
    MemoryDb,
    backend::{Backend, FileBackend, OwnerBackend, TagBackend},
    ids::{FileId, OwnerId, OwnerKind},
    ingestion::{self, Ingested},
    model::{File, User},
    tag::{FileTag, Tag, TagData, TagType},
};

struct Fixture {
    vault: MemoryDb,
    alice: OwnerId,
    bob: OwnerId,
}

impl Fixture {
    fn new(config: Config) -> Self {
        let vault = MemoryDb::new(config);
        let alice = add_user(&vault, "alice");
        let bob = add_user(&vault, "bob");
        Self { vault, alice, bob }
    }

    fn ingest(&self, owner: OwnerId, name: &str, bytes: &[u8]) -> Ingested {
        let done = ingestion::ingest_file(
            &self.vault,
            self.vault.config(),
            File::new(owner, name),
            "text/plain",
            bytes,
        )
        .unwrap();
        ingestion::index_file(&self.vault, &done.file, bytes).unwrap();
        done
    }
}

fn add_user(vault: &MemoryDb, name: &str) -> OwnerId {
    let owners = vault.owners();
    let id = owners
        .reserve(OwnerId::new(OwnerKind::User), name)
        .unwrap();
    owners.insert(&User::new(id, name).into()).unwrap();
    id
}

fn id_of(done: &Ingested) -> FileId {
    done.file.id.clone().unwrap()
}

#[test]
fn report_word_merges_across_scopes() {
    let fx = Fixture::new(Config::default());
    let file = FileId::from_parts(
        docvault::ids::StoreId::for_content(b"f1"),
        1,
    );
    let tags = fx.vault.tags();
    tags.upsert(&[FileTag::new(
        file.clone(),
        fx.alice,
        Tag::new("report", TagType::NAME),
    )])
    .unwrap();
    tags.upsert(&[FileTag::new(
        file.clone(),
        fx.alice,
        Tag::new("report", TagType::CONTENT),
    )])
    .unwrap();

    let got = tags.get(&file, &fx.alice).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].tag.word, "report");
    assert_eq!(got[0].tag.ty, TagType::NAME | TagType::CONTENT);
}

#[test]
fn dedup_across_owners_keeps_file_tags_private() {
    let fx = Fixture::new(Config::default());
    let a = fx.ingest(fx.alice, "alpha.txt", b"shared words here");
    let b = fx.ingest(fx.bob, "beta.txt", b"shared words here");

    assert_eq!(a.store, b.store);
    assert!(b.deduplicated);
    assert_eq!(fx.vault.stats()["stores"], 1);
    assert_eq!(fx.vault.stats()["files"], 2);

    let seen_by_bob = fx.vault.tags().get(&id_of(&a), &fx.bob).unwrap();
    assert!(seen_by_bob.iter().any(|t| t.tag.word == "shared"));
    assert!(!seen_by_bob.iter().any(|t| t.tag.word == "alpha"));
}

#[test]
fn search_owned_and_by_access() {
    let fx = Fixture::new(Config::default());
    let report = fx.ingest(fx.alice, "q3-report.txt", b"revenue grew");
    fx.ingest(fx.alice, "notes.txt", b"revenue fell");

    let tags = fx.vault.tags();
    let owned = tags
        .search_owned(
            &fx.alice,
            &[
                Tag::new("revenue", TagType::CONTENT),
                Tag::new("report", TagType::NAME),
            ],
        )
        .unwrap();
    assert_eq!(owned, vec![id_of(&report)]);

    assert!(
        tags.search_owned(&fx.bob, &[Tag::new("revenue", TagType::CONTENT)])
            .unwrap()
            .is_empty()
    );

    let mut shared = report.file.clone();
    shared.share("view", fx.bob);
    fx.vault.files().update(&shared).unwrap();
    let by_access = tags
        .search_access(
            &fx.bob,
            "view",
            &[Tag::regex("^rev", TagType::CONTENT)],
        )
        .unwrap();
    assert_eq!(by_access, vec![id_of(&report)]);
}

#[test]
fn file_scope_filter_sees_every_owners_tags() {
    let fx = Fixture::new(Config::default());
    let done = fx.ingest(fx.alice, "plain.txt", b"body");
    let id = id_of(&done);
    fx.vault
        .tags()
        .upsert(&[FileTag::new(
            id.clone(),
            fx.bob,
            Tag::new("bobs-label", TagType::USER),
        )])
        .unwrap();

    let hits = fx
        .vault
        .tags()
        .search_files(
            std::slice::from_ref(&id),
            &[Tag::new("bobs-label", TagType::USER)],
        )
        .unwrap();
    assert_eq!(hits, vec![id]);
}

#[test]
fn regex_filter_wire_shape() {
    let filter: Tag = serde_json::from_value(serde_json::json!({
        "word": "^gr",
        "type": (TagType::CONTENT | TagType::SEARCH).bits(),
        "data": { "SEARCH": { "regex": true } }
    }))
    .unwrap();
    assert!(filter.is_regex());

    let fx = Fixture::new(Config::default());
    let done = fx.ingest(fx.alice, "a.txt", b"green grass");
    let hits = fx.vault.tags().search_owned(&fx.alice, &[filter]).unwrap();
    assert_eq!(hits, vec![id_of(&done)]);

    let exact = Tag::new("^gr", TagType::CONTENT).with_data(
        TagData::new().with(TagType::SEARCH, "regex", false),
    );
    assert!(
        fx.vault
            .tags()
            .search_owned(&fx.alice, &[exact])
            .unwrap()
            .is_empty()
    );
}

#[test]
fn quota_is_checked_before_writing() {
    let fx = Fixture::new(Config {
        user_quota: 8,
        ..Config::default()
    });
    fx.ingest(fx.alice, "a", b"12345678");

    let err = ingestion::ingest_file(
        &fx.vault,
        fx.vault.config(),
        File::new(fx.alice, "b"),
        "text/plain",
        &b"9"[..],
    )
    .unwrap_err();
    assert!(matches!(err, Error::QuotaExceeded { .. }));
    assert_eq!(fx.vault.stats()["stores"], 1);
}

#[test]
fn groups_have_no_space_by_default() {
    let fx = Fixture::new(Config::default());
    let owners = fx.vault.owners();
    let gid = owners
        .reserve(OwnerId::new(OwnerKind::Group), "team")
        .unwrap();
    owners
        .insert(&docvault::model::Group::new(gid, "team", fx.alice).into())
        .unwrap();

    let err = ingestion::ingest_file(
        &fx.vault,
        fx.vault.config(),
        File::new(gid, "g.txt"),
        "text/plain",
        &b"x"[..],
    )
    .unwrap_err();
    assert!(matches!(err, Error::QuotaExceeded { total: 0, .. }));
}
