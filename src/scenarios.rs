//! Synthetic terrains shared by the demo binaries and the test suite.
//! Level files go through `TerrainData::from_packed`; these are assembled
//! in-process.

use crate::terrain::{circle_polygon, rect_polygon, ContourSpec, TerrainData};

/// Open water at 50 ft, no contours at all.
pub fn open_ocean() -> TerrainData {
    TerrainData::assemble(&[], -50.0).unwrap()
}

/// One round island (coastline contour at height 0, radius 100) in 50 ft of
/// water. Waves from -x cast a shadow behind it.
pub fn circular_island() -> TerrainData {
    TerrainData::assemble(
        &[ContourSpec {
            polygon: circle_polygon(0.0, 0.0, 100.0, 96),
            height: 0.0,
            parent: None,
        }],
        -50.0,
    )
    .unwrap()
}

/// Concentric shelves stepping up toward a central coastline: -30 at radius
/// 400, -10 at 200, 0 at 100, open ocean at -50 outside.
pub fn nested_shelves() -> TerrainData {
    TerrainData::assemble(
        &[
            ContourSpec {
                polygon: circle_polygon(0.0, 0.0, 400.0, 128),
                height: -30.0,
                parent: None,
            },
            ContourSpec {
                polygon: circle_polygon(0.0, 0.0, 200.0, 128),
                height: -10.0,
                parent: Some(0),
            },
            ContourSpec {
                polygon: circle_polygon(0.0, 0.0, 100.0, 128),
                height: 0.0,
                parent: Some(1),
            },
        ],
        -50.0,
    )
    .unwrap()
}

/// A shore that shoals from open water up onto dry land: nested rectangular
/// steps from -40 through the waterline to +5, blended into a ramp by the
/// terrain query. Waves travelling +x break near x = 0.
pub fn breaking_beach() -> TerrainData {
    let heights = [-40.0, -30.0, -20.0, -10.0, 0.0, 5.0];
    let specs: Vec<ContourSpec> = heights
        .iter()
        .enumerate()
        .map(|(i, &h)| {
            let inset = i as f32;
            ContourSpec {
                polygon: rect_polygon(
                    -400.0 + inset * 100.0,
                    -2000.0 + inset * 10.0,
                    2400.0 - inset * 10.0,
                    2000.0 - inset * 10.0,
                ),
                height: h,
                parent: if i == 0 { None } else { Some(i - 1) },
            }
        })
        .collect();
    TerrainData::assemble(&specs, -50.0).unwrap()
}

/// Scenario lookup used by the demo binaries.
pub fn by_name(name: &str) -> Option<TerrainData> {
    match name {
        "open-ocean" => Some(open_ocean()),
        "island" => Some(circular_island()),
        "shelves" => Some(nested_shelves()),
        "beach" => Some(breaking_beach()),
        _ => None,
    }
}
