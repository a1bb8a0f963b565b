use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ulid::Ulid;

use super::*;
use crate::model::*;
use crate::notify::NotifyHub;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("bunkd_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn stay(a: &str, b: &str) -> StayRange {
    StayRange::new(d(a), d(b))
}

/// Pinned to the morning of 2025-06-01 so the June stays used throughout
/// these tests are always in the future.
struct FixedClock;

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        d("2025-06-01")
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }
}

struct ApproveAll;

#[async_trait]
impl PaymentAuthorizer for ApproveAll {
    async fn authorize(&self, _request: &AuthorizationRequest) -> AuthorizationDecision {
        AuthorizationDecision::Approved
    }
}

struct DeclineAll;

#[async_trait]
impl PaymentAuthorizer for DeclineAll {
    async fn authorize(&self, _request: &AuthorizationRequest) -> AuthorizationDecision {
        AuthorizationDecision::Declined("Payment gateway declined the transaction".into())
    }
}

fn test_engine(name: &str) -> Engine {
    engine_with(name, Arc::new(ApproveAll))
}

fn engine_with(name: &str, authorizer: Arc<dyn PaymentAuthorizer>) -> Engine {
    let path = test_wal_path(name);
    Engine::new(path, Arc::new(NotifyHub::new()), Arc::new(FixedClock), authorizer).unwrap()
}

/// Reopen an engine on the same WAL (replay path).
fn reopen(name: &str) -> Engine {
    let dir = std::env::temp_dir().join("bunkd_test_engine");
    Engine::new(
        dir.join(name),
        Arc::new(NotifyHub::new()),
        Arc::new(FixedClock),
        Arc::new(ApproveAll),
    )
    .unwrap()
}

/// Register a user, an approved hostel owned by them, and one dorm room.
async fn seed_room(engine: &Engine, total_beds: u32, price: f64) -> (Ulid, Ulid, Ulid) {
    let user = Ulid::new();
    engine
        .register_user(user, "Asha".into(), "asha@example.com".into(), UserRole::Owner)
        .await
        .unwrap();
    let hostel = Ulid::new();
    engine
        .add_hostel(hostel, user, "Backpack Inn".into(), "Lisbon".into(), "12 Rua Azul".into())
        .await
        .unwrap();
    engine.set_hostel_approval(hostel, true).await.unwrap();
    let room = Ulid::new();
    engine
        .add_room(room, hostel, RoomType::Dorm, total_beds, price)
        .await
        .unwrap();
    (user, hostel, room)
}

async fn available(engine: &Engine, room: &Ulid) -> u32 {
    engine
        .store
        .get_room(room)
        .unwrap()
        .read()
        .await
        .available_beds
}

// ── Directory ────────────────────────────────────────────────────

#[tokio::test]
async fn engine_register_and_list_users() {
    let engine = test_engine("register_users.wal");
    let id = Ulid::new();
    engine
        .register_user(id, "Noor".into(), "noor@example.com".into(), UserRole::User)
        .await
        .unwrap();

    let users = engine.list_users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, id);
    assert_eq!(users[0].role, UserRole::User);
}

#[tokio::test]
async fn engine_duplicate_user_rejected() {
    let engine = test_engine("dup_user.wal");
    let id = Ulid::new();
    engine
        .register_user(id, "Noor".into(), "noor@example.com".into(), UserRole::User)
        .await
        .unwrap();
    let result = engine
        .register_user(id, "Other".into(), "other@example.com".into(), UserRole::User)
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn engine_hostel_requires_existing_owner() {
    let engine = test_engine("hostel_no_owner.wal");
    let result = engine
        .add_hostel(Ulid::new(), Ulid::new(), "Ghost Inn".into(), "Porto".into(), "1 Rua".into())
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound { entity: EntityKind::User, .. })
    ));
}

#[tokio::test]
async fn engine_hostel_starts_unapproved() {
    let engine = test_engine("hostel_unapproved.wal");
    let owner = Ulid::new();
    engine
        .register_user(owner, "Asha".into(), "asha@example.com".into(), UserRole::Owner)
        .await
        .unwrap();
    let hostel = Ulid::new();
    engine
        .add_hostel(hostel, owner, "New Place".into(), "Lisbon".into(), "3 Rua".into())
        .await
        .unwrap();

    let hostels = engine.list_hostels(None);
    assert_eq!(hostels.len(), 1);
    assert!(!hostels[0].approved);

    engine.set_hostel_approval(hostel, true).await.unwrap();
    assert!(engine.list_hostels(None)[0].approved);
}

#[tokio::test]
async fn engine_city_search_skips_unapproved() {
    let engine = test_engine("city_search.wal");
    let owner = Ulid::new();
    engine
        .register_user(owner, "Asha".into(), "asha@example.com".into(), UserRole::Owner)
        .await
        .unwrap();

    let approved = Ulid::new();
    engine
        .add_hostel(approved, owner, "Open Door".into(), "Lisbon".into(), "1 Rua".into())
        .await
        .unwrap();
    engine.set_hostel_approval(approved, true).await.unwrap();

    let pending = Ulid::new();
    engine
        .add_hostel(pending, owner, "Still Waiting".into(), "Lisbon".into(), "2 Rua".into())
        .await
        .unwrap();

    // Unfiltered listing shows both; city search only the approved one.
    assert_eq!(engine.list_hostels(None).len(), 2);
    let in_lisbon = engine.list_hostels(Some("Lisbon"));
    assert_eq!(in_lisbon.len(), 1);
    assert_eq!(in_lisbon[0].id, approved);
    assert!(engine.list_hostels(Some("Porto")).is_empty());
}

#[tokio::test]
async fn engine_room_on_unapproved_hostel_fails() {
    let engine = test_engine("room_unapproved.wal");
    let owner = Ulid::new();
    engine
        .register_user(owner, "Asha".into(), "asha@example.com".into(), UserRole::Owner)
        .await
        .unwrap();
    let hostel = Ulid::new();
    engine
        .add_hostel(hostel, owner, "New Place".into(), "Lisbon".into(), "3 Rua".into())
        .await
        .unwrap();

    let result = engine
        .add_room(Ulid::new(), hostel, RoomType::Dorm, 4, 100.0)
        .await;
    assert!(matches!(result, Err(EngineError::HostelNotApproved(_))));
}

#[tokio::test]
async fn engine_room_shape_validated() {
    let engine = test_engine("room_shape.wal");
    let (_, hostel, _) = seed_room(&engine, 4, 100.0).await;

    let zero_beds = engine
        .add_room(Ulid::new(), hostel, RoomType::Dorm, 0, 100.0)
        .await;
    assert!(matches!(zero_beds, Err(EngineError::InvalidRoomShape(_))));

    let negative_price = engine
        .add_room(Ulid::new(), hostel, RoomType::Private, 2, -5.0)
        .await;
    assert!(matches!(negative_price, Err(EngineError::InvalidRoomShape(_))));
}

#[tokio::test]
async fn engine_update_room_patch() {
    let engine = test_engine("update_room.wal");
    let (_, _, room) = seed_room(&engine, 4, 100.0).await;

    engine
        .update_room(
            room,
            RoomPatch {
                room_type: Some(RoomType::Private),
                price_per_night: Some(150.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let rooms = engine.list_rooms(None).await;
    assert_eq!(rooms[0].room_type, RoomType::Private);
    assert_eq!(rooms[0].price_per_night, 150.0);
    // Untouched fields keep their values.
    assert_eq!(rooms[0].total_beds, 4);
    assert_eq!(rooms[0].available_beds, 4);
}

#[tokio::test]
async fn engine_update_room_cannot_shrink_below_available() {
    let engine = test_engine("shrink_room.wal");
    let (_, _, room) = seed_room(&engine, 4, 100.0).await;

    // available is still 4; shrinking total to 2 would strand beds.
    let result = engine
        .update_room(
            room,
            RoomPatch {
                total_beds: Some(2),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(EngineError::InvalidBedCount { .. })));
}

#[tokio::test]
async fn engine_set_availability_bounds() {
    let engine = test_engine("set_avail.wal");
    let (_, _, room) = seed_room(&engine, 6, 100.0).await;

    engine.set_room_availability(room, 2).await.unwrap();
    assert_eq!(available(&engine, &room).await, 2);

    let over = engine.set_room_availability(room, 7).await;
    assert!(matches!(over, Err(EngineError::InvalidBedCount { .. })));
    assert_eq!(available(&engine, &room).await, 2);
}

#[tokio::test]
async fn engine_delete_room_with_active_booking_fails() {
    let engine = test_engine("delete_room_active.wal");
    let (user, hostel, room) = seed_room(&engine, 4, 100.0).await;

    let booking = Ulid::new();
    engine
        .create_booking(
            booking,
            user,
            hostel,
            room,
            stay("2025-06-10", "2025-06-12"),
            1,
            BookingStatus::Confirmed,
        )
        .await
        .unwrap();

    let blocked = engine.delete_room(room).await;
    assert!(matches!(blocked, Err(EngineError::HasActiveBookings(_))));

    engine.cancel_booking(booking, None).await.unwrap();
    engine.delete_room(room).await.unwrap();
    assert!(engine.list_rooms(None).await.is_empty());
    assert!(engine.list_bookings(BookingFilter::Id(booking)).await.is_empty());
}

// ── Booking lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn engine_booking_reserves_and_prices() {
    let engine = test_engine("booking_price.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let booking = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            2,
            BookingStatus::Confirmed,
        )
        .await
        .unwrap();

    // 4 nights x 300 x 2 beds.
    assert_eq!(booking.total_price, 2400.0);
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(available(&engine, &room).await, 4);
}

#[tokio::test]
async fn engine_overlap_rejected_despite_free_beds() {
    let engine = test_engine("overlap_beds.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            2,
            BookingStatus::Confirmed,
        )
        .await
        .unwrap();

    // 4 beds still free, but the date ranges intersect.
    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-03", "2025-06-07"),
            1,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(result, Err(EngineError::DatesUnavailable { .. })));
    assert_eq!(available(&engine, &room).await, 4);
}

#[tokio::test]
async fn engine_back_to_back_stays_allowed() {
    let engine = test_engine("back_to_back.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            2,
            BookingStatus::Confirmed,
        )
        .await
        .unwrap();

    // Checkout morning == checkin morning is not an overlap.
    engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-05", "2025-06-08"),
            1,
            BookingStatus::Confirmed,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn engine_cancel_restores_beds() {
    let engine = test_engine("cancel_restore.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let booking = Ulid::new();
    engine
        .create_booking(
            booking,
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            2,
            BookingStatus::Confirmed,
        )
        .await
        .unwrap();
    assert_eq!(available(&engine, &room).await, 4);

    engine.cancel_booking(booking, Some("change of plans")).await.unwrap();
    assert_eq!(available(&engine, &room).await, 6);

    let after = engine.list_bookings(BookingFilter::Id(booking)).await;
    assert_eq!(after[0].status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn engine_insufficient_beds_no_mutation() {
    let engine = test_engine("too_many_beds.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            7,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(
        result,
        Err(EngineError::InsufficientBeds { requested: 7, available: 6 })
    ));
    assert_eq!(available(&engine, &room).await, 6);
    assert!(engine.list_bookings(BookingFilter::All).await.is_empty());
}

#[tokio::test]
async fn engine_resolution_order_user_before_dates() {
    let engine = test_engine("resolution_order.wal");
    let (_, hostel, room) = seed_room(&engine, 6, 300.0).await;

    // Both the user and the dates are wrong; the missing user wins.
    let result = engine
        .create_booking(
            Ulid::new(),
            Ulid::new(),
            hostel,
            room,
            stay("2025-05-01", "2025-05-05"),
            1,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound { entity: EntityKind::User, .. })
    ));
}

#[tokio::test]
async fn engine_past_checkin_rejected() {
    let engine = test_engine("past_checkin.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-05-20", "2025-06-05"),
            1,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(result, Err(EngineError::CheckInInPast)));
}

#[tokio::test]
async fn engine_same_day_checkout_rejected() {
    let engine = test_engine("same_day.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    // Zero-night stay: check-out must be strictly after check-in.
    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-03", "2025-06-03"),
            1,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(result, Err(EngineError::CheckOutNotAfterCheckIn)));
}

#[tokio::test]
async fn engine_booking_on_unapproved_hostel_rejected() {
    let engine = test_engine("book_unapproved.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    // Approval can be revoked after rooms exist.
    engine.set_hostel_approval(hostel, false).await.unwrap();
    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            1,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(result, Err(EngineError::HostelNotApproved(_))));
}

#[tokio::test]
async fn engine_zero_bed_booking_rejected() {
    let engine = test_engine("zero_beds.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            0,
            BookingStatus::Confirmed,
        )
        .await;
    assert!(matches!(result, Err(EngineError::ZeroBeds)));
}

#[tokio::test]
async fn engine_booking_created_only_in_entry_states() {
    let engine = test_engine("entry_states.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let result = engine
        .create_booking(
            Ulid::new(),
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            1,
            BookingStatus::Cancelled,
        )
        .await;
    assert!(matches!(result, Err(EngineError::InvalidInitialStatus(_))));
}

#[tokio::test]
async fn engine_duplicate_booking_id_rejected() {
    let engine = test_engine("dup_booking.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let id = Ulid::new();
    engine
        .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-03"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();
    let result = engine
        .create_booking(id, user, hostel, room, stay("2025-06-10", "2025-06-12"), 1, BookingStatus::Confirmed)
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn engine_cancel_twice_fails() {
    let engine = test_engine("cancel_twice.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let id = Ulid::new();
    engine
        .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-03"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();
    engine.cancel_booking(id, None).await.unwrap();

    let again = engine.cancel_booking(id, None).await;
    assert!(matches!(again, Err(EngineError::AlreadyCancelled(_))));
    // The release must not have run twice.
    assert_eq!(available(&engine, &room).await, 6);
}

#[tokio::test]
async fn engine_cancel_completed_fails() {
    let engine = test_engine("cancel_completed.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let id = Ulid::new();
    engine
        .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-03"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();
    engine.update_status(id, BookingStatus::Completed).await.unwrap();

    let result = engine.cancel_booking(id, None).await;
    assert!(matches!(result, Err(EngineError::AlreadyCompleted(_))));
}

#[tokio::test]
async fn engine_status_overwrite_has_no_inventory_effect() {
    let engine = test_engine("raw_status.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let id = Ulid::new();
    engine
        .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-03"), 2, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(available(&engine, &room).await, 4);

    // The raw switch skips the cancellation flow: status flips, beds stay reserved.
    engine.update_status(id, BookingStatus::Cancelled).await.unwrap();
    let after = engine.list_bookings(BookingFilter::Id(id)).await;
    assert_eq!(after[0].status, BookingStatus::Cancelled);
    assert_eq!(available(&engine, &room).await, 4);
}

#[tokio::test]
async fn engine_statistics_counts_by_status() {
    let engine = test_engine("statistics.wal");
    let (user, hostel, room) = seed_room(&engine, 10, 50.0).await;

    let mut ids = Vec::new();
    for i in 0..5u32 {
        let id = Ulid::new();
        let start = d("2025-06-01") + chrono::Duration::days(i64::from(i) * 3);
        let end = start + chrono::Duration::days(2);
        engine
            .create_booking(id, user, hostel, room, StayRange::new(start, end), 1, BookingStatus::Confirmed)
            .await
            .unwrap();
        ids.push(id);
    }
    engine.cancel_booking(ids[3], None).await.unwrap();
    engine.update_status(ids[4], BookingStatus::Completed).await.unwrap();

    let stats = engine.statistics().await;
    assert_eq!(stats.total, 5);
    assert_eq!(stats.confirmed, 3);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn engine_booking_events_reach_subscribers() {
    let engine = test_engine("booking_notify.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let mut rx = engine.notify.subscribe(room);
    let id = Ulid::new();
    engine
        .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-03"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();

    match rx.try_recv().unwrap() {
        Event::BookingCreated { id: got, .. } => assert_eq!(got, id),
        other => panic!("unexpected event: {other:?}"),
    }
}

// ── Payments ─────────────────────────────────────────────────────

async fn pending_booking(engine: &Engine) -> (Ulid, Ulid, Ulid, Ulid) {
    let (user, hostel, room) = seed_room(engine, 6, 300.0).await;
    let booking = Ulid::new();
    engine
        .create_booking(
            booking,
            user,
            hostel,
            room,
            stay("2025-06-01", "2025-06-05"),
            2,
            BookingStatus::PendingPayment,
        )
        .await
        .unwrap();
    (user, hostel, room, booking)
}

#[tokio::test]
async fn engine_pending_booking_reserves_eagerly() {
    let engine = test_engine("pending_reserves.wal");
    let (_, _, room, booking) = pending_booking(&engine).await;

    // Beds come off the shelf at creation, not at payment time.
    assert_eq!(available(&engine, &room).await, 4);
    let b = engine.list_bookings(BookingFilter::Id(booking)).await;
    assert_eq!(b[0].status, BookingStatus::PendingPayment);
}

#[tokio::test]
async fn engine_payment_approved_confirms_booking() {
    let engine = test_engine("pay_approved.wal");
    let (_, _, _, booking) = pending_booking(&engine).await;

    let payment = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::CreditCard, Some("4111111111111111".into()))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, 2400.0);
    assert!(payment.transaction_id.unwrap().starts_with("TXN-"));
    assert!(payment.paid_at.is_some());
    assert!(payment.failure_reason.is_none());

    let b = engine.list_bookings(BookingFilter::Id(booking)).await;
    assert_eq!(b[0].status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn engine_payment_declined_leaves_booking_pending() {
    let engine = engine_with("pay_declined.wal", Arc::new(DeclineAll));
    let (_, _, room, booking) = pending_booking(&engine).await;

    let payment = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::Upi, Some("asha@upi".into()))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.transaction_id.is_none());
    assert!(payment.paid_at.is_none());
    assert_eq!(
        payment.failure_reason.as_deref(),
        Some("Payment gateway declined the transaction")
    );

    let b = engine.list_bookings(BookingFilter::Id(booking)).await;
    assert_eq!(b[0].status, BookingStatus::PendingPayment);
    // The failed attempt releases nothing.
    assert_eq!(available(&engine, &room).await, 4);
}

#[tokio::test]
async fn engine_payment_requires_awaiting_booking() {
    let engine = test_engine("pay_confirmed.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let booking = Ulid::new();
    engine
        .create_booking(booking, user, hostel, room, stay("2025-06-01", "2025-06-05"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();

    let result = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::Cash, None)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotAwaitingPayment { status: BookingStatus::Confirmed, .. })
    ));
}

#[tokio::test]
async fn engine_failed_payment_blocks_retry() {
    let engine = engine_with("pay_retry.wal", Arc::new(DeclineAll));
    let (_, _, _, booking) = pending_booking(&engine).await;

    engine
        .process_payment(Ulid::new(), booking, PaymentMethod::DebitCard, None)
        .await
        .unwrap();

    // The booking still awaits payment, but its one payment slot is used.
    let retry = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::DebitCard, None)
        .await;
    assert!(matches!(retry, Err(EngineError::PaymentAlreadyProcessed(_))));
}

#[tokio::test]
async fn engine_payment_for_missing_booking() {
    let engine = test_engine("pay_missing.wal");
    let result = engine
        .process_payment(Ulid::new(), Ulid::new(), PaymentMethod::Cash, None)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound { entity: EntityKind::Booking, .. })
    ));
}

#[tokio::test]
async fn engine_refund_only_completed_payments() {
    let engine = engine_with("refund_failed.wal", Arc::new(DeclineAll));
    let (_, _, _, booking) = pending_booking(&engine).await;

    let payment = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::CreditCard, None)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    let result = engine.refund_payment(payment.id).await;
    assert!(matches!(result, Err(EngineError::NotRefundable { .. })));
}

#[tokio::test]
async fn engine_refund_flips_payment_only() {
    let engine = test_engine("refund_ok.wal");
    let (_, _, room, booking) = pending_booking(&engine).await;

    let payment = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::CreditCard, None)
        .await
        .unwrap();
    engine.refund_payment(payment.id).await.unwrap();

    let refunded = engine.list_payments(PaymentFilter::Id(payment.id)).await;
    assert_eq!(refunded[0].status, PaymentStatus::Refunded);

    // Neither the booking nor the inventory is reversed by a refund.
    let b = engine.list_bookings(BookingFilter::Id(booking)).await;
    assert_eq!(b[0].status, BookingStatus::Confirmed);
    assert_eq!(available(&engine, &room).await, 4);

    let again = engine.refund_payment(payment.id).await;
    assert!(matches!(again, Err(EngineError::NotRefundable { .. })));
}

// ── Queries ──────────────────────────────────────────────────────

#[tokio::test]
async fn engine_booking_filters() {
    let engine = test_engine("booking_filters.wal");

    let owner_a = Ulid::new();
    engine
        .register_user(owner_a, "Asha".into(), "asha@example.com".into(), UserRole::Owner)
        .await
        .unwrap();
    let owner_b = Ulid::new();
    engine
        .register_user(owner_b, "Bruno".into(), "bruno@example.com".into(), UserRole::Owner)
        .await
        .unwrap();
    let guest = Ulid::new();
    engine
        .register_user(guest, "Noor".into(), "noor@example.com".into(), UserRole::User)
        .await
        .unwrap();

    let mut rooms = Vec::new();
    let mut hostels = Vec::new();
    for owner in [owner_a, owner_b] {
        let hostel = Ulid::new();
        engine
            .add_hostel(hostel, owner, "Inn".into(), "Lisbon".into(), "Rua".into())
            .await
            .unwrap();
        engine.set_hostel_approval(hostel, true).await.unwrap();
        let room = Ulid::new();
        engine
            .add_room(room, hostel, RoomType::Dorm, 8, 40.0)
            .await
            .unwrap();
        hostels.push(hostel);
        rooms.push(room);
    }

    let b1 = Ulid::new();
    engine
        .create_booking(b1, guest, hostels[0], rooms[0], stay("2025-06-01", "2025-06-03"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();
    let b2 = Ulid::new();
    engine
        .create_booking(b2, owner_b, hostels[0], rooms[0], stay("2025-06-03", "2025-06-05"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();
    let b3 = Ulid::new();
    engine
        .create_booking(b3, guest, hostels[1], rooms[1], stay("2025-06-01", "2025-06-04"), 2, BookingStatus::PendingPayment)
        .await
        .unwrap();

    assert_eq!(engine.list_bookings(BookingFilter::All).await.len(), 3);
    assert_eq!(engine.list_bookings(BookingFilter::Id(b2)).await.len(), 1);
    assert_eq!(engine.list_bookings(BookingFilter::User(guest)).await.len(), 2);
    assert_eq!(engine.list_bookings(BookingFilter::Hostel(hostels[0])).await.len(), 2);
    assert_eq!(engine.list_bookings(BookingFilter::Room(rooms[1])).await.len(), 1);
    assert_eq!(engine.list_bookings(BookingFilter::Owner(owner_a)).await.len(), 2);
    assert_eq!(engine.list_bookings(BookingFilter::Owner(owner_b)).await.len(), 1);
    assert_eq!(
        engine
            .list_bookings(BookingFilter::Status(BookingStatus::PendingPayment))
            .await
            .len(),
        1
    );
    assert!(engine.list_bookings(BookingFilter::Id(Ulid::new())).await.is_empty());
}

#[tokio::test]
async fn engine_payments_by_user() {
    let engine = test_engine("payments_by_user.wal");
    let (user, _, _, booking) = pending_booking(&engine).await;

    let payment = engine
        .process_payment(Ulid::new(), booking, PaymentMethod::CreditCard, None)
        .await
        .unwrap();

    let by_user = engine.list_payments(PaymentFilter::User(user)).await;
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].id, payment.id);
    assert_eq!(
        engine.list_payments(PaymentFilter::Booking(booking)).await.len(),
        1
    );
    assert!(engine.list_payments(PaymentFilter::User(Ulid::new())).await.is_empty());
}

// ── Persistence ──────────────────────────────────────────────────

#[tokio::test]
async fn engine_wal_replay_restores_state() {
    let booking = Ulid::new();
    let room;
    {
        let engine = test_engine("replay_state.wal");
        let (user, hostel, r) = seed_room(&engine, 6, 300.0).await;
        room = r;
        engine
            .create_booking(booking, user, hostel, room, stay("2025-06-01", "2025-06-05"), 2, BookingStatus::PendingPayment)
            .await
            .unwrap();
        engine
            .process_payment(Ulid::new(), booking, PaymentMethod::CreditCard, None)
            .await
            .unwrap();
    }

    let engine = reopen("replay_state.wal");
    assert_eq!(engine.list_users().len(), 1);
    assert_eq!(engine.list_hostels(None).len(), 1);
    assert_eq!(available(&engine, &room).await, 4);

    let restored = engine.list_bookings(BookingFilter::Id(booking)).await;
    assert_eq!(restored[0].status, BookingStatus::Confirmed);
    assert_eq!(restored[0].total_price, 2400.0);
    let payment = restored[0].payment.as_ref().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.transaction_id.as_ref().unwrap().starts_with("TXN-"));
}

#[tokio::test]
async fn engine_replay_after_cancel_restores_beds() {
    let room;
    {
        let engine = test_engine("replay_cancel.wal");
        let (user, hostel, r) = seed_room(&engine, 6, 300.0).await;
        room = r;
        let id = Ulid::new();
        engine
            .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-05"), 2, BookingStatus::Confirmed)
            .await
            .unwrap();
        engine.cancel_booking(id, None).await.unwrap();
    }

    let engine = reopen("replay_cancel.wal");
    assert_eq!(available(&engine, &room).await, 6);
}

#[tokio::test]
async fn engine_replay_after_room_delete() {
    let room;
    {
        let engine = test_engine("replay_delete.wal");
        let (_, _, r) = seed_room(&engine, 6, 300.0).await;
        room = r;
        engine.delete_room(room).await.unwrap();
    }

    let engine = reopen("replay_delete.wal");
    assert!(engine.store.get_room(&room).is_none());
    assert!(engine.list_rooms(None).await.is_empty());
}

#[tokio::test]
async fn engine_compaction_preserves_state() {
    let engine = test_engine("compact_state.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let kept = Ulid::new();
    engine
        .create_booking(kept, user, hostel, room, stay("2025-06-01", "2025-06-05"), 2, BookingStatus::PendingPayment)
        .await
        .unwrap();
    engine
        .process_payment(Ulid::new(), kept, PaymentMethod::CreditCard, None)
        .await
        .unwrap();
    let gone = Ulid::new();
    engine
        .create_booking(gone, user, hostel, room, stay("2025-06-10", "2025-06-12"), 1, BookingStatus::Confirmed)
        .await
        .unwrap();
    engine.cancel_booking(gone, None).await.unwrap();

    let before_bookings = engine.list_bookings(BookingFilter::All).await;
    let before_available = available(&engine, &room).await;
    let before_stats = engine.statistics().await;

    engine.compact_wal().await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, 0);
    drop(engine);

    let engine = reopen("compact_state.wal");
    assert_eq!(engine.list_bookings(BookingFilter::All).await, before_bookings);
    assert_eq!(available(&engine, &room).await, before_available);
    assert_eq!(engine.statistics().await, before_stats);
}

// update_status can strand reserved beds (no inventory effect); the
// availability pin written at the end of a compacted log must carry that
// drift across a replay instead of recomputing it away.
#[tokio::test]
async fn engine_compaction_preserves_availability_drift() {
    let engine = test_engine("compact_drift.wal");
    let (user, hostel, room) = seed_room(&engine, 6, 300.0).await;

    let id = Ulid::new();
    engine
        .create_booking(id, user, hostel, room, stay("2025-06-01", "2025-06-05"), 2, BookingStatus::Confirmed)
        .await
        .unwrap();
    engine.update_status(id, BookingStatus::Cancelled).await.unwrap();
    assert_eq!(available(&engine, &room).await, 4);

    engine.compact_wal().await.unwrap();
    drop(engine);

    let engine = reopen("compact_drift.wal");
    assert_eq!(available(&engine, &room).await, 4);
    let b = engine.list_bookings(BookingFilter::Id(id)).await;
    assert_eq!(b[0].status, BookingStatus::Cancelled);
}

// ── Concurrency ──────────────────────────────────────────────────

#[tokio::test]
async fn engine_concurrent_bookings_never_oversell() {
    let engine = Arc::new(test_engine("concurrent_beds.wal"));
    let (user, hostel, room) = seed_room(&engine, 10, 50.0).await;

    // 20 disjoint stays, one bed each, racing for 10 beds.
    let mut handles = Vec::new();
    for i in 0..20i64 {
        let engine = engine.clone();
        let start = d("2025-06-02") + chrono::Duration::days(i * 4);
        let range = StayRange::new(start, start + chrono::Duration::days(2));
        handles.push(tokio::spawn(async move {
            engine
                .create_booking(Ulid::new(), user, hostel, room, range, 1, BookingStatus::Confirmed)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(EngineError::InsufficientBeds { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 10);
    assert_eq!(available(&engine, &room).await, 0);
}

#[tokio::test]
async fn engine_concurrent_same_range_single_winner() {
    let engine = Arc::new(test_engine("concurrent_range.wal"));
    let (user, hostel, room) = seed_room(&engine, 10, 50.0).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .create_booking(
                    Ulid::new(),
                    user,
                    hostel,
                    room,
                    stay("2025-06-01", "2025-06-05"),
                    1,
                    BookingStatus::Confirmed,
                )
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(EngineError::DatesUnavailable { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(available(&engine, &room).await, 9);
}

// ── Vertical: a season at one hostel ─────────────────────────────

#[tokio::test]
async fn vertical_hostel_season() {
    let engine = test_engine("vertical_season.wal");

    let owner = Ulid::new();
    engine
        .register_user(owner, "Mara".into(), "mara@example.com".into(), UserRole::Owner)
        .await
        .unwrap();
    let guest = Ulid::new();
    engine
        .register_user(guest, "Jonas".into(), "jonas@example.com".into(), UserRole::User)
        .await
        .unwrap();

    let hostel = Ulid::new();
    engine
        .add_hostel(hostel, owner, "Tagus View".into(), "Lisbon".into(), "7 Beco das Flores".into())
        .await
        .unwrap();

    // Nothing bookable until the listing is approved.
    assert!(engine.list_hostels(Some("Lisbon")).is_empty());
    engine.set_hostel_approval(hostel, true).await.unwrap();

    let dorm = Ulid::new();
    engine
        .add_room(dorm, hostel, RoomType::Dorm, 8, 25.0)
        .await
        .unwrap();
    let private = Ulid::new();
    engine
        .add_room(private, hostel, RoomType::Private, 2, 80.0)
        .await
        .unwrap();

    // A walk-in group takes half the dorm for the festival week.
    let festival = Ulid::new();
    engine
        .create_booking(festival, guest, hostel, dorm, stay("2025-06-06", "2025-06-09"), 4, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(available(&engine, &dorm).await, 4);

    // An online guest takes the private room, gated on payment.
    let online = Ulid::new();
    let private_booking = engine
        .create_booking(online, guest, hostel, private, stay("2025-06-06", "2025-06-10"), 2, BookingStatus::PendingPayment)
        .await
        .unwrap();
    assert_eq!(private_booking.total_price, 4.0 * 80.0 * 2.0);
    assert_eq!(available(&engine, &private).await, 0);

    let payment = engine
        .process_payment(Ulid::new(), online, PaymentMethod::CreditCard, Some("4111111111111111".into()))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);

    // The festival group cancels; the dorm frees up for the same week.
    engine.cancel_booking(festival, Some("festival rained out")).await.unwrap();
    assert_eq!(available(&engine, &dorm).await, 8);
    engine
        .create_booking(Ulid::new(), guest, hostel, dorm, stay("2025-06-06", "2025-06-09"), 2, BookingStatus::Confirmed)
        .await
        .unwrap();

    // Season closes: the private stay completes, the books are checked.
    engine.update_status(online, BookingStatus::Completed).await.unwrap();
    let stats = engine.statistics().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 1);

    let owner_view = engine.list_bookings(BookingFilter::Owner(owner)).await;
    assert_eq!(owner_view.len(), 3);
}
