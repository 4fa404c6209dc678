//! End-to-end workflow tests over the offline fixture
//!
//! Every test logs in through `SessionManager` and works against the
//! in-memory spreadsheet, the way the CLI does with `--fixture`.

use std::path::Path;
use std::sync::Arc;

use armory_sheets::armory::Armory;
use armory_sheets::balance::{fetch_balances, ItemKind};
use armory_sheets::config::ArmoryConfig;
use armory_sheets::error::ArmoryError;
use armory_sheets::export::export_csv;
use armory_sheets::grouping::group_by_status;
use armory_sheets::logistics::{LogisticsBoard, OrderItem, RowKey};
use armory_sheets::parser;
use armory_sheets::session::{Session, SessionManager};
use armory_sheets::sheets::{MemoryConnector, MemorySheetStore, SheetStore};
use armory_sheets::transition::{Decision, RejectReason, SignatureCapture};
use armory_sheets::types::{BatchWrite, CellUpdate, Purpose, Status};
use pretty_assertions::assert_eq;

const LOGISTICS: &str = "לוגיסטיקה-א";

struct Fixture {
    sessions: SessionManager,
    store: Arc<MemorySheetStore>,
}

impl Fixture {
    fn new() -> Self {
        let config = ArmoryConfig::load(Path::new("test-data/armory.yaml")).unwrap();
        let connector = MemoryConnector::load_fixture(Path::new("test-data/fixture.yaml")).unwrap();
        let store = connector.store_handle();
        Self {
            sessions: SessionManager::new(Arc::new(connector), Arc::new(config)),
            store,
        }
    }

    fn config(&self) -> &ArmoryConfig {
        self.sessions.config()
    }

    async fn login(&self, token: &str) -> Arc<Session> {
        self.sessions.login(token).await.unwrap()
    }
}

fn by_id(id: &str) -> RowKey {
    RowKey {
        row_id: Some(id.to_string()),
        row: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOGISTICS LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_order_sign_out_rearm_lifecycle() {
    let fx = Fixture::new();

    // Company staff orders
    let staff = fx.login("tok-a").await;
    let board = LogisticsBoard::new(fx.config(), &staff, LOGISTICS).unwrap();
    let mut gloves = OrderItem::new("כפפות", 3);
    gloves.purpose = Purpose::Issue;
    let ids = board.submit_order(&[gloves]).await.unwrap();
    assert_eq!(ids.len(), 1);

    // Logistics signs it out
    let logistics = fx.login("tok-log").await;
    let board = LogisticsBoard::new(fx.config(), &logistics, LOGISTICS).unwrap();
    let pending = match board
        .transition(&by_id(&ids[0]), Status::Order, Status::SignOut)
        .await
        .unwrap()
    {
        Decision::NeedsSignature(pending) => pending,
        other => panic!("expected a signature request, got {:?}", other),
    };
    assert_eq!(pending.items[0].quantity, 3);

    let capture = SignatureCapture {
        signer_name: "אבי".to_string(),
        signature: "data:image/png;base64,CCCC".to_string(),
    };
    let applied = board.complete_sign_out(&pending, &capture).await.unwrap();
    assert_eq!(applied.rows.len(), 1);

    let view = board.view().await.unwrap();
    assert_eq!(view.groups.get(Status::SignOut).len(), 2);
    let summary = view.signature_summary.iter().find(|r| r.item == "כפפות").unwrap();
    assert_eq!(summary.quantity, 3);
    assert_eq!(summary.signer, "אבי");

    // The order row itself can still move to re-arm
    let decision = board
        .transition(&by_id(&ids[0]), Status::Order, Status::ReArm)
        .await
        .unwrap();
    assert!(matches!(decision, Decision::Applied(_)));
    assert_eq!(board.view().await.unwrap().groups.get(Status::ReArm).len(), 1);

    // order + sign-out + re-arm
    assert_eq!(fx.store.snapshot("תיעוד").len(), 4);
}

#[tokio::test]
async fn test_wear_order_reverts_to_order() {
    let fx = Fixture::new();
    let logistics = fx.login("tok-log").await;
    let board = LogisticsBoard::new(fx.config(), &logistics, LOGISTICS).unwrap();

    let decision = board
        .transition(&by_id("id-2"), Status::Order, Status::SignOut)
        .await
        .unwrap();
    match decision {
        Decision::Rejected(rejection) => {
            assert_eq!(rejection.reason, RejectReason::WearItem);
            assert_eq!(rejection.revert_to, Status::Order);
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
    assert_eq!(fx.store.write_count(), 0);
}

#[tokio::test]
async fn test_stale_status_after_concurrent_edit() {
    let fx = Fixture::new();
    let logistics = fx.login("tok-log").await;
    let board = LogisticsBoard::new(fx.config(), &logistics, LOGISTICS).unwrap();

    board
        .transition(&by_id("id-1"), Status::Order, Status::ReArm)
        .await
        .unwrap();

    // A second client still believes the row is an order
    let decision = board
        .transition(&by_id("id-1"), Status::Order, Status::SignOut)
        .await
        .unwrap();
    match decision {
        Decision::Rejected(rejection) => assert_eq!(rejection.reason, RejectReason::StaleStatus),
        other => panic!("expected a rejection, got {:?}", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SHEET ACCESS PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_append_then_refetch_is_last_row() {
    let fx = Fixture::new();
    let session = fx.login("tok-log").await;
    let sheet = fx.config().equipment_sheet("ציוד").unwrap().clone();

    let row: Vec<String> = ["קסדה", "1", "דני", "רון", "6.10.2026, 10:00:00"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    session.store().append_rows(&sheet, vec![row.clone()]).await.unwrap();

    let grid = session.store().fetch_sheet(&sheet).await.unwrap();
    assert_eq!(grid.last(), Some(&row));
    assert_eq!(grid.len(), 3);
}

#[tokio::test]
async fn test_rejected_batch_applies_nothing() {
    let fx = Fixture::new();
    let session = fx.login("tok-log").await;
    let sheet = fx.config().logistics_sheet(LOGISTICS).unwrap().clone();
    let before = fx.store.snapshot(LOGISTICS);

    fx.store.fail_next_write();
    let batch = BatchWrite::new()
        .update(CellUpdate::new(sheet.id, 1, 7, "התעצמות"))
        .append(sheet.id, vec![vec!["x".to_string()]]);
    let err = session.store().batch_write(batch).await.unwrap_err();

    assert!(matches!(err, ArmoryError::WriteFailed(_)));
    assert_eq!(fx.store.snapshot(LOGISTICS), before);
}

#[tokio::test]
async fn test_parse_and_group_every_tab() {
    let fx = Fixture::new();
    let session = fx.login("tok-log").await;
    let columns = &fx.config().logistics_columns;

    for sheet in fx.config().all_sheets() {
        let grid = session.store().fetch_sheet(sheet).await.unwrap();
        let records = parser::parse(&grid);
        assert_eq!(records.len(), grid.len().saturating_sub(1), "{}", sheet.name);
        let header = parser::header(&grid);
        assert!(records.iter().all(|r| header.iter().all(|h| r.has(h))));

        let groups = group_by_status(&records, &columns.status, &Status::ALL);
        assert!(groups.total() <= records.len());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_expired_token_tears_down_session() {
    let fx = Fixture::new();
    let session = fx.login("tok-log").await;
    fx.store.expire_token();

    let err = fetch_balances(fx.config(), session.store().clone()).await.unwrap_err();
    assert!(err.is_auth_expired());
    assert!(fx.sessions.observe(&err));
    assert!(fx.sessions.current().is_none());
}

#[tokio::test]
async fn test_login_without_permissions_is_denied() {
    let fx = Fixture::new();
    assert!(matches!(
        fx.sessions.login("tok-none").await,
        Err(ArmoryError::AccessDenied(_))
    ));
    assert!(fx.sessions.current().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// ARMORY AND BALANCES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_repair_moves_stock_into_defective() {
    let fx = Fixture::new();
    let session = fx.login("tok-log").await;

    let before = fetch_balances(fx.config(), session.store().clone()).await.unwrap();
    let m16 = before.weapons.row("M16").unwrap().clone();

    Armory::new(fx.config(), &session)
        .send_to_repair(ItemKind::Weapon, "M16", "1004")
        .await
        .unwrap();

    let after = fetch_balances(fx.config(), session.store().clone()).await.unwrap();
    let moved = after.weapons.row("M16").unwrap();
    assert_eq!(moved.in_stock, m16.in_stock - 1);
    assert_eq!(moved.defective, m16.defective + 1);
    assert_eq!(moved.total, m16.total);
}

#[tokio::test]
async fn test_return_all_keeps_total() {
    let fx = Fixture::new();
    let session = fx.login("tok-a").await;
    let armory = Armory::new(fx.config(), &session);

    let receipt = armory.return_all("א", "ישראל ישראלי").await.unwrap();
    assert_eq!(receipt.serials, vec!["1001".to_string(), "S-1".to_string()]);

    let report = fetch_balances(fx.config(), session.store().clone()).await.unwrap();
    let m16 = report.weapons.row("M16").unwrap();
    assert_eq!((m16.issued, m16.in_stock, m16.total), (1, 3, 5));
    let m5 = report.optics.row("M5").unwrap();
    assert_eq!((m5.issued, m5.in_stock), (0, 2));
}

#[tokio::test]
async fn test_export_roster() {
    let fx = Fixture::new();
    let session = fx.login("tok-a").await;
    let sheet = fx.config().unit("א").unwrap();
    let records = parser::parse(&session.store().fetch_sheet(sheet).await.unwrap());

    let csv = export_csv(&records).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("\"דנה לוי\",\"M16\",\"1002\""));
}
