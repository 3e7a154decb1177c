//! End-to-end tests for the stock pipeline.
//!
//! Tests: ItemDraft → StockService → Ledger → ItemStore → history
//!
//! Verifies:
//! - Movements update stock and append history in one unit of work
//! - Deleting items removes their history
//! - Config drives the service the same way across stores

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stockroom_core::{ItemId, Versioned};
    use stockroom_inventory::{ItemDraft, MovementKind, MovementRequest, Stock};

    use crate::config::StockroomConfig;
    use crate::item_store::{InMemoryItemStore, ItemStore};
    use crate::stock_service::{StockError, StockService};

    fn setup(config: &StockroomConfig) -> StockService<Arc<InMemoryItemStore>> {
        stockroom_observability::init_for_tests();
        StockService::from_config(Arc::new(InMemoryItemStore::new()), config)
    }

    #[tokio::test]
    async fn receive_issue_and_audit_an_item() {
        let svc = setup(&StockroomConfig::default());

        let bolts = svc
            .add_item(ItemDraft::new("Hex Bolt", "Fasteners").with_pieces_per_box(50))
            .await
            .unwrap();
        let id = bolts.id_typed();

        svc.apply_movement(MovementRequest::pull_in(id, 4, 0)).await.unwrap();
        svc.apply_movement(MovementRequest::new(id, MovementKind::PullIn).pieces(30))
            .await
            .unwrap();
        let out = svc
            .apply_movement(MovementRequest::new(id, MovementKind::PullOut).boxes(1).pieces(5))
            .await
            .unwrap();
        assert!(!out.clamped);

        let stored = svc.get_item(id).await.unwrap();
        assert_eq!(
            stored.stock(),
            Stock {
                boxes: 3,
                pieces: 25,
                total_pieces: 175,
            }
        );
        assert!(stored.stock().is_consistent(stored.pieces_per_box()));
        assert_eq!(stored.version(), 3);

        let history = svc.list_movements(id).await.unwrap();
        let audit: Vec<(i64, &str, &str)> = history
            .iter()
            .map(|m| (m.pieces_affected, m.previous_stock.as_str(), m.new_stock.as_str()))
            .collect();
        assert_eq!(
            audit,
            vec![
                (-55, "4 boxes & 30 pieces", "3 boxes & 25 pieces"),
                (30, "4 boxes & 0 pieces", "4 boxes & 30 pieces"),
                (200, "0 boxes & 0 pieces", "4 boxes & 0 pieces"),
            ]
        );
    }

    #[tokio::test]
    async fn deleting_items_removes_their_history() {
        let svc = setup(&StockroomConfig::default());
        let items = svc
            .bulk_add_items(vec![
                ItemDraft::new("Nut", "Fasteners"),
                ItemDraft::new("Washer", "Fasteners"),
            ])
            .await
            .unwrap();
        let ids: Vec<ItemId> = items.iter().map(|i| i.id_typed()).collect();
        for id in &ids {
            svc.pull_in(*id, Some(1), None).await.unwrap();
        }

        assert_eq!(svc.delete_items(&ids).await.unwrap(), 2);
        assert!(svc.list_items().await.unwrap().is_empty());
        for id in &ids {
            assert_eq!(svc.list_movements(*id).await.unwrap_err(), StockError::NotFound);
            assert!(svc.store().list_movements(*id).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn configured_default_conversion_factor_applies_to_new_items() {
        let config = StockroomConfig::from_lookup(|key| match key {
            "STOCKROOM_DEFAULT_PIECES_PER_BOX" => Some("12".to_string()),
            _ => None,
        })
        .unwrap();
        let svc = setup(&config);

        let item = svc.add_item(ItemDraft::new("Fuse", "Electrical")).await.unwrap();
        let out = svc.pull_in(item.id_typed(), Some(2), Some(1)).await.unwrap();
        assert_eq!(out.item.stock().total_pieces, 25);
    }

    #[tokio::test]
    async fn items_serialize_with_flat_stock_fields() {
        let svc = setup(&StockroomConfig::default());
        let item = svc.add_item(ItemDraft::new("Fuse", "Electrical")).await.unwrap();
        let out = svc.pull_in(item.id_typed(), Some(1), Some(2)).await.unwrap();

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["item"]["name"], "Fuse");
        assert_eq!(json["item"]["boxes"], 1);
        assert_eq!(json["item"]["total_pieces"], 26);
        assert_eq!(json["movement"]["kind"], "pull_in");
        assert_eq!(json["clamped"], false);
    }
}
