use anyhow::Result;
use needful_lib::household;
use needful_lib::household_active::{
    HouseholdContext, MemoryStore, SessionStore, StoreHandle, ACTIVE_HOUSEHOLD_KEY,
};

mod util;
use util::{household_owned_by, memory_pool};

#[tokio::test]
async fn resolve_keeps_a_valid_pointer() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, ctx) = household_owned_by(&pool, "alice", "Flat").await?;
    assert_eq!(ctx.resolve_active(&pool, "alice").await?, Some(hh.id));
    assert_eq!(ctx.get_active(), Some(hh.id));
    Ok(())
}

#[tokio::test]
async fn resolve_clears_pointer_to_missing_household() -> Result<()> {
    let pool = memory_pool().await?;
    let ctx = HouseholdContext::in_memory();
    ctx.set_active(77);
    assert_eq!(ctx.resolve_active(&pool, "alice").await?, None);
    assert_eq!(ctx.store().snapshot(), None);
    Ok(())
}

#[tokio::test]
async fn resolve_clears_pointer_after_membership_ends() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;

    // set without validation, as a raw session value would be
    let ctx = HouseholdContext::in_memory();
    ctx.set_active(hh.id);
    assert_eq!(ctx.get_active(), Some(hh.id));
    assert_eq!(ctx.resolve_active(&pool, "mallory").await?, None);
    assert_eq!(ctx.get_active(), None);
    Ok(())
}

#[tokio::test]
async fn resolve_drops_unparsable_values() -> Result<()> {
    let pool = memory_pool().await?;
    let store = MemoryStore::default();
    store.set(ACTIVE_HOUSEHOLD_KEY, "abc");
    let ctx = HouseholdContext::new(StoreHandle::new(store));

    assert_eq!(ctx.get_active(), None);
    assert_eq!(ctx.resolve_active(&pool, "alice").await?, None);
    assert_eq!(ctx.store().snapshot(), None);
    Ok(())
}

#[tokio::test]
async fn contexts_are_independent_per_session() -> Result<()> {
    let pool = memory_pool().await?;
    let (first, alice) = household_owned_by(&pool, "alice", "First").await?;
    let (second, _) = household_owned_by(&pool, "bob", "Second").await?;

    let bob_phone = HouseholdContext::in_memory();
    household::join_household(&pool, &bob_phone, "bob", first.id).await?;
    let bob_laptop = HouseholdContext::in_memory();
    household::switch_household(&pool, &bob_laptop, "bob", second.id).await?;

    assert_eq!(alice.get_active(), Some(first.id));
    assert_eq!(bob_phone.get_active(), Some(first.id));
    assert_eq!(bob_laptop.get_active(), Some(second.id));
    Ok(())
}

#[tokio::test]
async fn file_backed_sessions_persist_switches() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("alice.json");

    let ctx = HouseholdContext::new(StoreHandle::file(&path)?);
    household::switch_household(&pool, &ctx, "alice", hh.id).await?;

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(
        raw.get(ACTIVE_HOUSEHOLD_KEY).and_then(|v| v.as_str()),
        Some(hh.id.to_string().as_str())
    );

    let later = HouseholdContext::new(StoreHandle::file(&path)?);
    assert_eq!(later.resolve_active(&pool, "alice").await?, Some(hh.id));
    Ok(())
}
