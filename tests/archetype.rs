mod common;

use ber_stock::archetype::{
    ARCHETYPE, SAMPLE_SIZE, apply_archetypes, create_archetypes, fill_with_archetypes,
};
use ber_stock::data::Value;
use ber_stock::frame::Column;
use common::{float_cells, frame, string_cells};

const HEATING_OIL: &str = "Heating Oil                   ";
const MAINS_GAS: &str = "Mains Gas                     ";
const ELECTRICITY: &str = "Electricity                   ";

fn dwelling_stock(first_wall_uvalue: Option<f64>, first_fuel: Option<&str>) -> ber_stock::frame::Frame {
    let mut fuels = vec![
        first_fuel,
        Some(MAINS_GAS),
        Some(HEATING_OIL),
        Some(HEATING_OIL),
        Some(HEATING_OIL),
        Some(MAINS_GAS),
        Some(HEATING_OIL),
        Some(HEATING_OIL),
        Some(ELECTRICITY),
        Some(MAINS_GAS),
    ];
    let fuel_cells: Vec<Option<Value>> = fuels
        .drain(..)
        .map(|fuel| fuel.map(|f| Value::String(f.to_string())))
        .collect();
    frame(vec![
        Column::new(
            "dwelling_type",
            string_cells(&[
                "Detached house",
                "Mid-terrace house",
                "End of terrace house",
                "Detached house",
                "Detached house",
                "End of terrace house",
                "Detached house",
                "Detached house",
                "Ground-floor apartment",
                "Ground-floor apartment",
            ]),
        ),
        Column::new(
            "wall_uvalue",
            float_cells(&[
                first_wall_uvalue,
                Some(2.09),
                Some(0.60),
                Some(1.77),
                Some(0.28),
                Some(0.37),
                Some(0.30),
                Some(2.00),
                Some(0.50),
                Some(0.94),
            ]),
        ),
        Column::new("main_sh_boiler_fuel", fuel_cells),
    ])
}

#[test]
fn groups_below_the_sample_threshold_are_dropped() {
    let stock = dwelling_stock(Some(1.83), Some(HEATING_OIL));
    let archetypes = create_archetypes(
        &stock,
        &["dwelling_type".to_string()],
        &[],
        1,
        "dwelling_type",
    )
    .unwrap();

    // Group sizes are {5, 1, 2, 2}; only the three groups above 1 survive.
    assert_eq!(archetypes.n_rows(), 3);
    let types: Vec<String> = (0..3)
        .map(|row| archetypes.cell(row, "dwelling_type").unwrap().as_display())
        .collect();
    assert_eq!(
        types,
        vec![
            "Detached house",
            "End of terrace house",
            "Ground-floor apartment"
        ]
    );

    let medians: Vec<f64> = (0..3)
        .map(|row| {
            archetypes
                .cell(row, "wall_uvalue")
                .unwrap()
                .as_f64()
                .unwrap()
        })
        .collect();
    assert_eq!(medians, vec![1.77, 0.485, 0.72]);

    let fuels: Vec<String> = (0..3)
        .map(|row| {
            archetypes
                .cell(row, "main_sh_boiler_fuel")
                .unwrap()
                .as_display()
        })
        .collect();
    assert_eq!(fuels, vec![HEATING_OIL, HEATING_OIL, ELECTRICITY]);

    let sizes: Vec<i64> = (0..3)
        .map(|row| archetypes.cell(row, SAMPLE_SIZE).unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(sizes, vec![5, 2, 2]);
    assert_eq!(
        archetypes.cell(0, ARCHETYPE),
        Some(&Value::String("dwelling_type".to_string()))
    );
}

#[test]
fn a_uniformly_small_grouping_retains_no_archetypes() {
    let stock = dwelling_stock(Some(1.83), Some(HEATING_OIL));
    let archetypes = create_archetypes(
        &stock,
        &["dwelling_type".to_string()],
        &[],
        10,
        "dwelling_type",
    )
    .unwrap();
    assert!(archetypes.is_empty());
}

#[test]
fn fill_adopts_archetype_values_for_missing_cells_only() {
    let stock = dwelling_stock(None, None);
    let archetypes = create_archetypes(
        &stock,
        &["dwelling_type".to_string()],
        &[],
        1,
        "dwelling_type",
    )
    .unwrap();
    let (filled, filled_cells) =
        fill_with_archetypes(&stock, &archetypes, &["dwelling_type".to_string()]).unwrap();

    // The missing Detached cells adopt the archetype's median and mode.
    assert_eq!(filled.cell(0, "wall_uvalue"), Some(&Value::Float(1.77)));
    assert_eq!(
        filled.cell(0, "main_sh_boiler_fuel"),
        Some(&Value::String(HEATING_OIL.to_string()))
    );
    // Existing values are never overwritten, even when an archetype exists.
    assert_eq!(filled.cell(3, "wall_uvalue"), Some(&Value::Float(1.77)));
    assert_eq!(filled.cell(4, "wall_uvalue"), Some(&Value::Float(0.28)));
    assert_eq!(filled.cell(7, "wall_uvalue"), Some(&Value::Float(2.0)));
    // Mid-terrace has no retained archetype: its gap stays, as does its value.
    assert_eq!(filled.cell(1, "wall_uvalue"), Some(&Value::Float(2.09)));
    assert_eq!(filled.cell(1, SAMPLE_SIZE), None);
    // Matched rows carry the provenance columns.
    assert_eq!(filled.cell(0, SAMPLE_SIZE), Some(&Value::Integer(5)));
    assert_eq!(
        filled.cell(9, ARCHETYPE),
        Some(&Value::String("dwelling_type".to_string()))
    );
    // Two attribute gaps plus the provenance columns of matched rows.
    assert!(filled_cells >= 2);
    // Row order is preserved.
    assert_eq!(
        filled.cell(1, "dwelling_type"),
        Some(&Value::String("Mid-terrace house".to_string()))
    );
}

#[test]
fn existing_values_survive_a_conflicting_archetype() {
    let stock = dwelling_stock(Some(1.83), Some(HEATING_OIL));
    let archetypes = create_archetypes(
        &stock,
        &["dwelling_type".to_string()],
        &[],
        1,
        "dwelling_type",
    )
    .unwrap();
    let (filled, _) =
        fill_with_archetypes(&stock, &archetypes, &["dwelling_type".to_string()]).unwrap();
    assert_eq!(filled.cell(0, "wall_uvalue"), Some(&Value::Float(1.83)));
}

#[test]
fn cascade_fills_remaining_gaps_with_coarser_passes() {
    // small_area "a" has enough rows for a local archetype; "b" does not and
    // must wait for the period-wide pass.
    let stock = frame(vec![
        Column::new("small_area", string_cells(&["a", "a", "a", "b", "b"])),
        Column::new(
            "period_built",
            string_cells(&["PRE19", "PRE19", "PRE19", "PRE19", "PRE19"]),
        ),
        Column::new(
            "wall_uvalue",
            float_cells(&[Some(1.0), Some(2.0), None, Some(3.0), None]),
        ),
    ]);
    let keysets = vec![
        vec!["small_area".to_string(), "period_built".to_string()],
        vec!["period_built".to_string()],
    ];
    let (filled, passes) = apply_archetypes(&stock, &keysets, &[], 2).unwrap();

    // Pass 1: only ("a", PRE19) exceeds the threshold; its gap takes the
    // local median of {1.0, 2.0}.
    assert_eq!(filled.cell(2, "wall_uvalue"), Some(&Value::Float(1.5)));
    // Pass 2 fills b's gap with the period-wide median of {1.0, 2.0, 1.5, 3.0}.
    assert_eq!(filled.cell(4, "wall_uvalue"), Some(&Value::Float(1.75)));
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].archetype, "small_area+period_built");
    assert_eq!(passes[1].archetype, "period_built");
    assert!(passes[0].archetype_count > 0);
    assert!(passes[1].archetype_count > 0);
}

#[test]
fn first_pass_without_archetypes_is_an_error() {
    let stock = frame(vec![
        Column::new("small_area", string_cells(&["a", "b"])),
        Column::new("period_built", string_cells(&["PRE19", "11L"])),
        Column::new("wall_uvalue", float_cells(&[Some(1.0), None])),
    ]);
    let keysets = vec![vec!["small_area".to_string(), "period_built".to_string()]];
    let err = apply_archetypes(&stock, &keysets, &[], 5).unwrap_err();
    assert!(err.to_string().contains("no archetypes"));
}

#[test]
fn later_pass_without_archetypes_leaves_the_stock_unchanged() {
    let stock = frame(vec![
        Column::new("small_area", string_cells(&["a", "a", "b"])),
        Column::new(
            "period_built",
            string_cells(&["PRE19", "PRE19", "11L"]),
        ),
        Column::new("wall_uvalue", float_cells(&[Some(1.0), None, Some(2.0)])),
    ]);
    // Pass 1 succeeds on ("a", PRE19); pass 2 groups on a missing column and
    // is skipped rather than raising.
    let keysets = vec![
        vec!["small_area".to_string(), "period_built".to_string()],
        vec!["countyname".to_string(), "period_built".to_string()],
    ];
    let (filled, passes) = apply_archetypes(&stock, &keysets, &[], 1).unwrap();
    assert_eq!(filled.cell(1, "wall_uvalue"), Some(&Value::Float(1.0)));
    assert_eq!(filled.cell(2, "wall_uvalue"), Some(&Value::Float(2.0)));
    assert_eq!(passes[1].archetype_count, 0);
    assert_eq!(passes[1].filled_cells, 0);
}
