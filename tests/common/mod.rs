// Each integration test binary compiles this module separately and no
// single test uses every helper.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tempfile::TempDir;

use lodestone::config::{IndexStorage, SearchConfig};
use lodestone::handlers::{
    ClauseHandlerRegistry, CustomFieldDefinition, CustomFieldSource, FieldSource,
    InMemoryCustomFields, SystemFieldSource,
};
use lodestone::types::{
    AllowAllScopes, Asset, AssetChange, AssetStatus, Catalog, CatalogDirectory, CustomValue,
    InMemoryAssetSource, InMemoryDirectory, Manufacturer, ScopePermissions,
};
use lodestone::{
    AssetIndexManager, FieldIndexerManager, FunctionRegistry, IndexLifecycleManager,
    SearchService,
};

pub const CATALOG_WIDGETS: u64 = 1;
pub const CATALOG_GADGETS: u64 = 2;
pub const MFR_ACME: u64 = 10;
pub const MFR_GLOBEX: u64 = 11;
pub const CF_COLOR: u64 = 7;

/// A fully wired search stack over a temp directory. Dropping the rig drops
/// the directory, so tests keep it alive for their whole body.
pub struct SearchRig {
    pub service: SearchService,
    pub source: Arc<InMemoryAssetSource>,
    pub custom_fields: Arc<InMemoryCustomFields>,
    pub lifecycle: Arc<IndexLifecycleManager>,
    _tmp: TempDir,
}

pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn status_change(from: AssetStatus, to: AssetStatus, y: i32, m: u32, d: u32) -> AssetChange {
    AssetChange {
        field: "status".to_string(),
        from: Some(from.as_str().to_string()),
        to: Some(to.as_str().to_string()),
        at: at(y, m, d),
    }
}

/// Eight assets across two catalogs. The interesting edges: asset 4 has no
/// manufacturer, asset 7 has no cost, asset 8 sits exactly on cost 100,
/// assets 3 and 6 carry status history.
pub fn standard_assets() -> Vec<Asset> {
    let mut anvil_press = Asset::new(1, "W-100", "Anvil Press", CATALOG_WIDGETS);
    anvil_press.description = Some("Hydraulic press for anvil forming".to_string());
    anvil_press.manufacturer_id = Some(MFR_ACME);
    anvil_press.cost = Some(150.0);
    anvil_press.list_price = Some(210.0);
    anvil_press.created = at(2024, 1, 10);
    anvil_press.updated = at(2024, 3, 1);
    anvil_press.custom_values.push(CustomValue {
        field_id: CF_COLOR,
        value: "red".to_string(),
    });

    let mut anvil_stand = Asset::new(2, "W-200", "Anvil Stand", CATALOG_WIDGETS);
    anvil_stand.manufacturer_id = Some(MFR_ACME);
    anvil_stand.cost = Some(80.0);
    anvil_stand.list_price = Some(110.0);
    anvil_stand.created = at(2024, 2, 5);
    anvil_stand.updated = at(2024, 2, 5);

    let mut torque_wrench = Asset::new(3, "W-300", "Torque Wrench", CATALOG_WIDGETS);
    torque_wrench.description = Some("Click-type torque wrench".to_string());
    torque_wrench.manufacturer_id = Some(MFR_GLOBEX);
    torque_wrench.cost = Some(120.0);
    torque_wrench.created = at(2024, 3, 1);
    torque_wrench.updated = at(2024, 3, 15);
    torque_wrench
        .history
        .push(status_change(AssetStatus::Pending, AssetStatus::Active, 2024, 3, 15));

    let mut plasma_cutter = Asset::new(4, "W-400", "Plasma Cutter", CATALOG_WIDGETS);
    plasma_cutter.cost = Some(999.5);
    plasma_cutter.created = at(2024, 4, 20);
    plasma_cutter.updated = at(2024, 4, 20);

    let mut laser_level = Asset::new(5, "G-100", "Laser Level", CATALOG_GADGETS);
    laser_level.manufacturer_id = Some(MFR_GLOBEX);
    laser_level.cost = Some(140.0);
    laser_level.created = at(2024, 5, 2);
    laser_level.updated = at(2024, 5, 2);

    let mut stud_finder = Asset::new(6, "G-200", "Stud Finder", CATALOG_GADGETS);
    stud_finder.manufacturer_id = Some(MFR_ACME);
    stud_finder.cost = Some(35.0);
    stud_finder.status = AssetStatus::Discontinued;
    stud_finder.created = at(2024, 5, 20);
    stud_finder.updated = at(2024, 7, 1);
    stud_finder
        .history
        .push(status_change(AssetStatus::Active, AssetStatus::Discontinued, 2024, 7, 1));
    stud_finder.custom_values.push(CustomValue {
        field_id: CF_COLOR,
        value: "green".to_string(),
    });

    let mut heat_gun = Asset::new(7, "G-300", "Heat Gun", CATALOG_GADGETS);
    heat_gun.manufacturer_id = Some(MFR_ACME);
    heat_gun.created = at(2024, 6, 11);
    heat_gun.updated = at(2024, 6, 11);

    let mut angle_grinder = Asset::new(8, "W-500", "Angle Grinder", CATALOG_WIDGETS);
    angle_grinder.manufacturer_id = Some(MFR_GLOBEX);
    angle_grinder.cost = Some(100.0);
    angle_grinder.created = at(2024, 7, 9);
    angle_grinder.updated = at(2024, 7, 9);

    vec![
        anvil_press,
        anvil_stand,
        torque_wrench,
        plasma_cutter,
        laser_level,
        stud_finder,
        heat_gun,
        angle_grinder,
    ]
}

pub fn standard_directory() -> InMemoryDirectory {
    InMemoryDirectory::new(
        vec![
            Catalog {
                id: CATALOG_WIDGETS,
                name: "Widgets".to_string(),
                active: true,
            },
            Catalog {
                id: CATALOG_GADGETS,
                name: "Gadgets".to_string(),
                active: true,
            },
        ],
        vec![
            Manufacturer {
                id: MFR_ACME,
                name: "Acme".to_string(),
            },
            Manufacturer {
                id: MFR_GLOBEX,
                name: "Globex".to_string(),
            },
        ],
    )
}

pub fn standard_custom_fields() -> Vec<CustomFieldDefinition> {
    vec![CustomFieldDefinition {
        id: CF_COLOR,
        display_name: "Color".to_string(),
    }]
}

pub fn rig() -> SearchRig {
    rig_with(standard_assets(), Arc::new(AllowAllScopes))
}

pub fn rig_with(assets: Vec<Asset>, permissions: Arc<dyn ScopePermissions>) -> SearchRig {
    build_rig(assets, permissions, standard_custom_fields(), None)
}

pub fn rig_with_extra_source(extra: Arc<dyn FieldSource>) -> SearchRig {
    build_rig(
        standard_assets(),
        Arc::new(AllowAllScopes),
        standard_custom_fields(),
        Some(extra),
    )
}

fn build_rig(
    assets: Vec<Asset>,
    permissions: Arc<dyn ScopePermissions>,
    custom_definitions: Vec<CustomFieldDefinition>,
    extra_source: Option<Arc<dyn FieldSource>>,
) -> SearchRig {
    let tmp = TempDir::new().unwrap();
    let config = SearchConfig {
        storage: IndexStorage::Custom {
            path: tmp.path().join("index"),
        },
        // Small batches so reindex runs cross batch boundaries even with
        // the eight-asset fixture.
        reindex_batch_size: 3,
        ..SearchConfig::default()
    };

    let custom_fields = Arc::new(InMemoryCustomFields::new(custom_definitions));
    let fields = Arc::new(FieldIndexerManager::new(
        Arc::new(lodestone::AssetSchema::new()),
        custom_fields.clone(),
    ));
    let source = Arc::new(InMemoryAssetSource::new(assets));

    let asset_manager =
        Arc::new(AssetIndexManager::new(&config, fields, source.clone()).unwrap());
    let lifecycle = Arc::new(IndexLifecycleManager::new(asset_manager));
    lifecycle.activate(true).unwrap();

    let mut sources: Vec<Arc<dyn FieldSource>> = vec![
        Arc::new(SystemFieldSource::new()),
        Arc::new(CustomFieldSource::new(custom_fields.clone())),
    ];
    if let Some(extra) = extra_source {
        sources.push(extra);
    }
    let registry = Arc::new(ClauseHandlerRegistry::new(sources).unwrap());

    let directory: Arc<dyn CatalogDirectory> = Arc::new(standard_directory());
    let service = SearchService::new(
        registry,
        Arc::new(FunctionRegistry::with_builtins()),
        directory,
        permissions,
        lifecycle.clone(),
    );

    SearchRig {
        service,
        source,
        custom_fields,
        lifecycle,
        _tmp: tmp,
    }
}
