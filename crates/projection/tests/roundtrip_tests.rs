//! Round-trip law for parsed pipelines: `inverse(forward(p)) ≈ p`.

use projection::{Coord, CoordinatePipeline, MemoryGridResolver, NoGrids, ShiftGrid};
use proptest::prelude::*;

fn parse(definition: &str) -> CoordinatePipeline {
    CoordinatePipeline::parse(definition, &NoGrids).unwrap()
}

// ============================================================================
// Geographic input
// ============================================================================

proptest! {
    #[test]
    fn webmerc_roundtrip(lon in -180.0..180.0_f64, lat in -85.0..85.0_f64) {
        let p = parse("+proj=webmerc +ellps=WGS84");
        let back = p.inverse(p.forward(Coord::xy(lon, lat)));
        prop_assert!((back.x - lon).abs() < 1e-9, "lon {} -> {}", lon, back.x);
        prop_assert!((back.y - lat).abs() < 1e-9, "lat {} -> {}", lat, back.y);
    }

    #[test]
    fn tmerc_roundtrip_near_meridian(dlon in -4.0..4.0_f64, lat in -80.0..80.0_f64) {
        let p = parse("+proj=tmerc +ellps=GRS80 +lon_0=15 +k_0=0.9996 +x_0=500000");
        let lon = 15.0 + dlon;
        let back = p.inverse(p.forward(Coord::xy(lon, lat)));
        prop_assert!((back.x - lon).abs() < 1e-9, "lon {} -> {}", lon, back.x);
        prop_assert!((back.y - lat).abs() < 1e-9, "lat {} -> {}", lat, back.y);
    }

    #[test]
    fn lcc_roundtrip(lon in -30.0..30.0_f64, lat in 20.0..75.0_f64) {
        let p = parse("+proj=lcc +ellps=intl +lat_1=35 +lat_2=65 +lat_0=52 +lon_0=10");
        let back = p.inverse(p.forward(Coord::xy(lon, lat)));
        prop_assert!((back.x - lon).abs() < 1e-9);
        prop_assert!((back.y - lat).abs() < 1e-9);
    }

    #[test]
    fn krovak_roundtrip(lon in 12.0..23.0_f64, lat in 47.5..51.5_f64) {
        let p = parse("+proj=krovak +ellps=bessel");
        let back = p.inverse(p.forward(Coord::xy(lon, lat)));
        prop_assert!((back.x - lon).abs() < 1e-9, "lon {} -> {}", lon, back.x);
        prop_assert!((back.y - lat).abs() < 1e-9, "lat {} -> {}", lat, back.y);
    }

    #[test]
    fn datum_chain_roundtrip(lon in 12.0..23.0_f64, lat in 47.0..52.0_f64, h in -100.0..3000.0_f64) {
        let p = parse(
            "+proj=pipeline +step +proj=cart +ellps=krass \
             +step +proj=helmert +x=23.92 +y=-141.27 +z=-80.9 +rx=0 +ry=-0.35 +rz=-0.82 \
                   +s=-0.12 +convention=position_vector \
             +step +inv +proj=cart +ellps=WGS84",
        );
        let back = p.inverse(p.forward(Coord::new(lon, lat, h)));
        prop_assert!((back.x - lon).abs() < 1e-9);
        prop_assert!((back.y - lat).abs() < 1e-9);
        prop_assert!((back.z - h).abs() < 1e-4);
    }
}

// ============================================================================
// Projected input
// ============================================================================

proptest! {
    #[test]
    fn krovak_inverse_roundtrip(e in -900_000.0..-430_000.0_f64, n in -1_330_000.0..-930_000.0_f64) {
        let p = parse("+proj=krovak +ellps=bessel").inverted();
        let back = p.inverse(p.forward(Coord::xy(e, n)));
        prop_assert!((back.x - e).abs() < 1e-6, "x {} -> {}", e, back.x);
        prop_assert!((back.y - n).abs() < 1e-6, "y {} -> {}", n, back.y);
    }

    #[test]
    fn projected_chain_roundtrip(e in -900_000.0..-430_000.0_f64, n in -1_330_000.0..-930_000.0_f64) {
        let p = parse(
            "+proj=pipeline +ellps=bessel \
             +step +inv +proj=krovak \
             +step +proj=cart \
             +step +proj=helmert +x=570.8 +y=85.7 +z=462.8 +rx=4.998 +ry=1.587 +rz=5.261 \
                   +s=3.56 +convention=position_vector \
             +step +inv +proj=cart +ellps=WGS84 \
             +step +proj=webmerc +ellps=WGS84",
        );
        let back = p.inverse(p.forward(Coord::xy(e, n)));
        prop_assert!((back.x - e).abs() < 1e-6, "x {} -> {}", e, back.x);
        prop_assert!((back.y - n).abs() < 1e-6, "y {} -> {}", n, back.y);
    }

    #[test]
    fn gridshift_roundtrip(lon in 16.5..19.5_f64, lat in 47.5..49.5_f64) {
        let mut resolver = MemoryGridResolver::new();
        resolver
            .insert(
                "ramp",
                ShiftGrid {
                    extent: [16.0, 47.0, 20.0, 50.0],
                    cols: 3,
                    rows: 2,
                    dlon: vec![0.5, 1.0, 1.5, 0.8, 1.2, 2.0],
                    dlat: vec![-0.2, 0.0, 0.3, -0.4, 0.1, 0.6],
                },
            )
            .unwrap();
        let p = CoordinatePipeline::parse("+proj=hgridshift +grids=ramp", &resolver).unwrap();
        let back = p.inverse(p.forward(Coord::xy(lon, lat)));
        prop_assert!((back.x - lon).abs() < 1e-11);
        prop_assert!((back.y - lat).abs() < 1e-11);
    }
}

#[test]
fn test_pipeline_inverse_is_reverse_order() {
    // Reversing the step order must change the result of a non-commuting pair
    let a = parse("+proj=pipeline +step +proj=webmerc +step +proj=helmert +x=10");
    let b = parse("+proj=pipeline +step +inv +proj=helmert +x=10 +step +inv +proj=webmerc");
    let c = Coord::xy(5.0, 45.0);
    let via_b = b.forward(a.forward(c));
    assert!((via_b.x - c.x).abs() < 1e-9);
    assert!((via_b.y - c.y).abs() < 1e-9);
}
