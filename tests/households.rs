use anyhow::Result;
use needful_lib::error::{
    ErrorKind, INTEGRITY_ALREADY_MEMBER, INTEGRITY_DUPLICATE_CATEGORY, INTEGRITY_NOT_OWNER,
    INTEGRITY_OWNER_CANNOT_LEAVE, MEMBERSHIP_NOT_FOUND,
};
use needful_lib::household_active::HouseholdContext;
use needful_lib::model::HouseholdRole;
use needful_lib::query::ItemFilter;
use needful_lib::{access, categories, household, items};

mod util;
use util::{household_owned_by, input, memory_pool};

#[tokio::test]
async fn create_adds_owner_membership_and_activates() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, ctx) = household_owned_by(&pool, "alice", "  Flat 4  ").await?;

    assert_eq!(hh.name, "Flat 4");
    assert_eq!(ctx.get_active(), Some(hh.id));
    let members = household::list_members(&pool, "alice", hh.id).await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, HouseholdRole::Owner);
    assert_eq!(members[0].user_id, "alice");
    Ok(())
}

#[tokio::test]
async fn invalid_name_writes_nothing() -> Result<()> {
    let pool = memory_pool().await?;
    let ctx = HouseholdContext::in_memory();
    let err = household::create_household(&pool, &ctx, "alice", &"x".repeat(101))
        .await
        .expect_err("name too long");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert!(err.context().contains_key("name"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM households")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);
    assert_eq!(ctx.get_active(), None);
    Ok(())
}

#[tokio::test]
async fn second_owner_row_is_rejected_by_schema() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;
    let res = sqlx::query(
        "INSERT INTO household_members (user_id, household_id, role, joined_at)
         VALUES ('bob', ?, 'owner', 0)",
    )
    .bind(hh.id)
    .execute(&pool)
    .await;
    assert!(res.is_err());
    Ok(())
}

#[tokio::test]
async fn join_is_gated_on_non_membership() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, alice) = household_owned_by(&pool, "alice", "Flat").await?;

    let err = household::join_household(&pool, &alice, "alice", hh.id)
        .await
        .expect_err("owner is already a member");
    assert_eq!(err.code(), INTEGRITY_ALREADY_MEMBER);

    let bob = HouseholdContext::in_memory();
    let err = household::join_household(&pool, &bob, "bob", hh.id + 100)
        .await
        .expect_err("missing household");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let member = household::join_household(&pool, &bob, "bob", hh.id).await?;
    assert_eq!(member.role, HouseholdRole::Member);
    assert_eq!(bob.get_active(), Some(hh.id));
    Ok(())
}

#[tokio::test]
async fn access_opens_when_a_user_joins() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;
    let mut shared = input("Olive oil");
    shared.household_id = Some(hh.id);
    let item = items::create_item(&pool, "alice", shared).await?;

    assert!(!access::can_access(&pool, &item.item, "bob").await?);
    let bob = HouseholdContext::in_memory();
    household::join_household(&pool, &bob, "bob", hh.id).await?;
    assert!(access::can_access(&pool, &item.item, "bob").await?);
    Ok(())
}

#[tokio::test]
async fn owner_cannot_leave_but_member_can() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, alice) = household_owned_by(&pool, "alice", "Flat").await?;

    let err = household::leave_household(&pool, &alice, "alice", hh.id)
        .await
        .expect_err("owner may not leave");
    assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
    assert_eq!(err.code(), INTEGRITY_OWNER_CANNOT_LEAVE);
    assert_eq!(alice.get_active(), Some(hh.id));

    let bob = HouseholdContext::in_memory();
    household::join_household(&pool, &bob, "bob", hh.id).await?;
    assert_eq!(bob.get_active(), Some(hh.id));
    household::leave_household(&pool, &bob, "bob", hh.id).await?;

    assert!(!household::is_member(&pool, "bob", hh.id).await?);
    assert_eq!(bob.get_active(), None);
    Ok(())
}

#[tokio::test]
async fn leaving_an_inactive_household_keeps_the_pointer() -> Result<()> {
    let pool = memory_pool().await?;
    let (first, _) = household_owned_by(&pool, "alice", "First").await?;
    let (second, _) = household_owned_by(&pool, "carol", "Second").await?;

    let bob = HouseholdContext::in_memory();
    household::join_household(&pool, &bob, "bob", first.id).await?;
    household::join_household(&pool, &bob, "bob", second.id).await?;
    assert_eq!(bob.get_active(), Some(second.id));

    household::leave_household(&pool, &bob, "bob", first.id).await?;
    assert_eq!(bob.get_active(), Some(second.id));

    let err = household::leave_household(&pool, &bob, "bob", first.id)
        .await
        .expect_err("no longer a member");
    assert_eq!(err.code(), MEMBERSHIP_NOT_FOUND);
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn switch_requires_membership() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;
    let bob = HouseholdContext::in_memory();

    let err = household::switch_household(&pool, &bob, "bob", hh.id)
        .await
        .expect_err("not a member");
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(bob.get_active(), None);

    household::join_household(&pool, &bob, "bob", hh.id).await?;
    bob.clear();
    let switched = household::switch_household(&pool, &bob, "bob", hh.id).await?;
    assert_eq!(switched.id, hh.id);
    assert_eq!(bob.get_active(), Some(hh.id));
    Ok(())
}

#[tokio::test]
async fn delete_is_owner_only_and_cascades() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, alice) = household_owned_by(&pool, "alice", "Flat").await?;
    let bob = HouseholdContext::in_memory();
    household::join_household(&pool, &bob, "bob", hh.id).await?;
    let category = categories::create_category(&pool, "alice", hh.id, "Cleaning").await?;
    let mut shared = input("Sponges");
    shared.household_id = Some(hh.id);
    shared.category_id = Some(category.id);
    items::create_item(&pool, "bob", shared).await?;
    items::create_item(&pool, "bob", input("Own socks")).await?;

    let err = household::delete_household(&pool, &bob, "bob", hh.id)
        .await
        .expect_err("bob is not the owner");
    assert_eq!(err.code(), INTEGRITY_NOT_OWNER);

    household::delete_household(&pool, &alice, "alice", hh.id).await?;
    assert_eq!(alice.get_active(), None);

    for table in ["household_members", "categories"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        assert_eq!(count, 0, "{table} should be empty");
    }
    let left = items::list_items(&pool, "bob", None, ItemFilter::default()).await?;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].item.name, "Own socks");

    // bob's pointer is stale now and resolves to nothing
    assert_eq!(bob.get_active(), Some(hh.id));
    assert_eq!(bob.resolve_active(&pool, "bob").await?, None);
    assert_eq!(bob.get_active(), None);
    Ok(())
}

#[tokio::test]
async fn listing_reports_role_and_member_count() -> Result<()> {
    let pool = memory_pool().await?;
    let (first, _) = household_owned_by(&pool, "alice", "First").await?;
    let (second, _) = household_owned_by(&pool, "carol", "Second").await?;
    let alice = HouseholdContext::in_memory();
    household::join_household(&pool, &alice, "alice", second.id).await?;

    let listed = household::list_households(&pool, "alice").await?;
    assert_eq!(listed.len(), 2);
    let first_entry = listed
        .iter()
        .find(|s| s.household.id == first.id)
        .expect("first listed");
    assert_eq!(first_entry.role, HouseholdRole::Owner);
    assert_eq!(first_entry.member_count, 1);
    let second_entry = listed
        .iter()
        .find(|s| s.household.id == second.id)
        .expect("second listed");
    assert_eq!(second_entry.role, HouseholdRole::Member);
    assert_eq!(second_entry.member_count, 2);

    let err = household::list_members(&pool, "bob", first.id)
        .await
        .expect_err("outsiders cannot list members");
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    Ok(())
}

#[tokio::test]
async fn categories_are_unique_per_household_ignoring_case() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;
    let (other, _) = household_owned_by(&pool, "bob", "Other").await?;

    categories::create_category(&pool, "alice", hh.id, "Groceries").await?;
    let err = categories::create_category(&pool, "alice", hh.id, "groceries")
        .await
        .expect_err("duplicate ignoring case");
    assert_eq!(err.code(), INTEGRITY_DUPLICATE_CATEGORY);
    categories::create_category(&pool, "bob", other.id, "Groceries").await?;

    let err = categories::create_category(&pool, "bob", hh.id, "Tools")
        .await
        .expect_err("bob is not a member of alice's household");
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    categories::create_category(&pool, "alice", hh.id, "bakery").await?;
    let names: Vec<String> = categories::list_categories(&pool, "alice", hh.id)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["bakery", "Groceries"]);
    Ok(())
}

#[tokio::test]
async fn deleting_a_category_keeps_its_items() -> Result<()> {
    let pool = memory_pool().await?;
    let (hh, _) = household_owned_by(&pool, "alice", "Flat").await?;
    let category = categories::create_category(&pool, "alice", hh.id, "Hardware").await?;
    let mut shared = input("Screws");
    shared.household_id = Some(hh.id);
    shared.category_id = Some(category.id);
    let item = items::create_item(&pool, "alice", shared).await?;
    assert_eq!(item.category_name.as_deref(), Some("Hardware"));

    let err = categories::delete_category(&pool, "bob", category.id)
        .await
        .expect_err("outsider");
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    categories::delete_category(&pool, "alice", category.id).await?;
    let reloaded = items::get_item(&pool, "alice", item.item.id).await?;
    assert_eq!(reloaded.item.category_id, None);
    assert_eq!(reloaded.category_name, None);
    Ok(())
}
