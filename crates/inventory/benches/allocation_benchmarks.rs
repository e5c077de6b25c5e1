use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tableshop_core::{CampaignId, ItemId, LotId, Quantity, StorageLocationId, WorldDay};
use tableshop_inventory::{InventoryLot, plan_consumption};

fn lots(count: i32) -> Vec<InventoryLot> {
    let now = Utc::now();
    (0..count)
        .map(|day| InventoryLot {
            lot_id: LotId::new(),
            campaign_id: CampaignId::new(),
            item_id: ItemId::new(),
            storage_location_id: StorageLocationId::new(),
            quantity_on_hand: Quantity::from_i64(5),
            unit_cost_minor: 100,
            acquired_world_day: WorldDay::new(day).unwrap(),
            source: None,
            notes: None,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn bench_plan_consumption(c: &mut Criterion) {
    let small = lots(10);
    let large = lots(1_000);

    c.bench_function("plan_consumption/10_lots", |b| {
        b.iter(|| plan_consumption(black_box(&small), black_box(Quantity::from_i64(23))))
    });

    c.bench_function("plan_consumption/1000_lots_full_drain", |b| {
        b.iter(|| plan_consumption(black_box(&large), black_box(Quantity::from_i64(5_000))))
    });
}

criterion_group!(benches, bench_plan_consumption);
criterion_main!(benches);
