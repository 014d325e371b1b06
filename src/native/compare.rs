//! Purpose: Equivalence tests between native objects under a chosen criterion.
//! Exports: `Criterion`, `is_equivalent`.
//! Role: Backs `GeoObject::is_equivalent_to`.
//! Invariants: Every criterion is reflexive; `Strict` implies `Equivalent`.

use std::sync::Arc;

use super::object::{
    Axis, BaseObject, CoordinateSystem, Crs, CrsKind, CsKind, Datum, DatumKind, Ellipsoid,
    Identifier, NativeRef, PrimeMeridian, UnitOfMeasure,
};
use super::operation::{CoordinateOperation, MethodFormula, OperationKind, OperationMethod};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Criterion {
    /// All properties, names included.
    Strict,
    /// Defining parameters only; names and metadata are ignored.
    Equivalent,
    /// As `Equivalent`, also accepting swapped axes on geographic CRSs.
    EquivalentExceptAxisOrderGeographic,
}

const RELATIVE_TOLERANCE: f64 = 1e-10;

fn close(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= RELATIVE_TOLERANCE * a.abs().max(b.abs())
}

pub fn is_equivalent(a: &NativeRef, b: &NativeRef, criterion: Criterion) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    let (a, b) = (a.as_any(), b.as_any());
    macro_rules! pair {
        ($ty:ty, $cmp:ident) => {
            if let (Some(x), Some(y)) = (a.downcast_ref::<$ty>(), b.downcast_ref::<$ty>()) {
                return match criterion {
                    Criterion::Strict => x == y,
                    _ => $cmp(x, y, criterion),
                };
            }
        };
    }
    pair!(Crs, crs_eq);
    pair!(Datum, datum_eq);
    pair!(Ellipsoid, ellipsoid_eq);
    pair!(PrimeMeridian, meridian_eq);
    pair!(CoordinateSystem, cs_eq);
    pair!(Axis, axis_eq);
    pair!(CoordinateOperation, operation_eq);
    pair!(OperationMethod, method_eq);
    pair!(UnitOfMeasure, unit_eq);
    pair!(Identifier, identifier_eq);
    false
}

fn unit_eq(a: &UnitOfMeasure, b: &UnitOfMeasure, _: Criterion) -> bool {
    a.kind == b.kind && close(a.to_si, b.to_si)
}

fn identifier_eq(a: &Identifier, b: &Identifier, _: Criterion) -> bool {
    a.code_space.eq_ignore_ascii_case(&b.code_space) && a.code == b.code
}

fn axis_eq(a: &Axis, b: &Axis, c: Criterion) -> bool {
    a.direction == b.direction && unit_eq(&a.unit, &b.unit, c)
}

fn ellipsoid_eq(a: &Ellipsoid, b: &Ellipsoid, _: Criterion) -> bool {
    close(a.semi_major_metre(), b.semi_major_metre())
        && close(a.semi_minor() * a.unit.to_si, b.semi_minor() * b.unit.to_si)
}

fn meridian_eq(a: &PrimeMeridian, b: &PrimeMeridian, _: Criterion) -> bool {
    close(a.longitude_degrees(), b.longitude_degrees())
}

fn cs_eq(a: &CoordinateSystem, b: &CoordinateSystem, c: Criterion) -> bool {
    a.kind == b.kind
        && a.axes.len() == b.axes.len()
        && a.axes.iter().zip(&b.axes).all(|(x, y)| axis_eq(x, y, c))
}

/// Geographic axes compared with the first two swapped.
fn cs_eq_swapped(a: &CoordinateSystem, b: &CoordinateSystem, c: Criterion) -> bool {
    if a.kind != CsKind::Ellipsoidal || a.axes.len() != b.axes.len() || a.axes.len() < 2 {
        return false;
    }
    let mut swapped: Vec<&Arc<Axis>> = b.axes.iter().collect();
    swapped.swap(0, 1);
    a.axes.iter().zip(swapped).all(|(x, y)| axis_eq(x, y, c))
}

fn datum_eq(a: &Datum, b: &Datum, c: Criterion) -> bool {
    match (&a.kind, &b.kind) {
        (
            DatumKind::GeodeticReferenceFrame {
                ellipsoid: ea,
                prime_meridian: pa,
            },
            DatumKind::GeodeticReferenceFrame {
                ellipsoid: eb,
                prime_meridian: pb,
            },
        ) => {
            ellipsoid_eq(ea, eb, c)
                && meridian_eq(pa, pb, c)
                && same_name_or_code(&a.meta.name, &b.meta.name, a, b)
        }
        (DatumKind::VerticalReferenceFrame, DatumKind::VerticalReferenceFrame)
        | (DatumKind::EngineeringDatum, DatumKind::EngineeringDatum)
        | (DatumKind::TemporalDatum { .. }, DatumKind::TemporalDatum { .. }) => {
            same_name_or_code(&a.meta.name, &b.meta.name, a, b)
        }
        _ => false,
    }
}

/// Datum equivalence used when matching catalog transformations.
pub(crate) fn same_datum(a: &Datum, b: &Datum) -> bool {
    datum_eq(a, b, Criterion::Equivalent)
}

/// Datums sharing an ellipsoid still differ when their names and codes do.
fn same_name_or_code(na: &str, nb: &str, a: &Datum, b: &Datum) -> bool {
    let ca = a.meta.epsg_code();
    if ca.is_some() && ca == b.meta.epsg_code() {
        return true;
    }
    normalized_name(na) == normalized_name(nb)
}

fn normalized_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect::<String>()
        .trim_end_matches("ensemble")
        .to_string()
}

fn crs_eq(a: &Crs, b: &Crs, c: Criterion) -> bool {
    match (&a.kind, &b.kind) {
        (
            CrsKind::Geographic {
                datum: da,
                cs: csa,
            },
            CrsKind::Geographic {
                datum: db,
                cs: csb,
            },
        ) => {
            datum_eq(da, db, c)
                && (cs_eq(csa, csb, c)
                    || (c == Criterion::EquivalentExceptAxisOrderGeographic
                        && cs_eq_swapped(csa, csb, c)))
        }
        (
            CrsKind::Projected {
                base: ba,
                conversion: va,
                cs: csa,
            },
            CrsKind::Projected {
                base: bb,
                conversion: vb,
                cs: csb,
            },
        ) => crs_eq(ba, bb, c) && operation_eq(va, vb, c) && cs_eq(csa, csb, c),
        (CrsKind::Compound { components: xa }, CrsKind::Compound { components: xb }) => {
            xa.len() == xb.len() && xa.iter().zip(xb).all(|(x, y)| crs_eq(x, y, c))
        }
        (CrsKind::Geodetic { datum: da, cs: csa }, CrsKind::Geodetic { datum: db, cs: csb })
        | (CrsKind::Vertical { datum: da, cs: csa }, CrsKind::Vertical { datum: db, cs: csb })
        | (CrsKind::Temporal { datum: da, cs: csa }, CrsKind::Temporal { datum: db, cs: csb })
        | (
            CrsKind::Engineering { datum: da, cs: csa },
            CrsKind::Engineering { datum: db, cs: csb },
        ) => datum_eq(da, db, c) && cs_eq(csa, csb, c),
        _ => false,
    }
}

fn method_eq(a: &OperationMethod, b: &OperationMethod, _: Criterion) -> bool {
    if a.formula != b.formula {
        return false;
    }
    a.formula != MethodFormula::Unknown
        || normalized_name(&a.meta.name) == normalized_name(&b.meta.name)
}

fn operation_eq(a: &CoordinateOperation, b: &CoordinateOperation, c: Criterion) -> bool {
    let kinds = match (&a.kind, &b.kind) {
        (OperationKind::Conversion(x), OperationKind::Conversion(y))
        | (OperationKind::Transformation(x), OperationKind::Transformation(y)) => {
            x.inverted == y.inverted
                && method_eq(&x.method, &y.method, c)
                && x.parameters.len() == y.parameters.len()
                && x.parameters.iter().all(|p| {
                    y.parameters
                        .iter()
                        .find(|q| q.code == p.code && (p.code.is_some() || q.name == p.name))
                        .is_some_and(|q| close(p.si_value(), q.si_value()))
                })
        }
        (OperationKind::Concatenated(xs), OperationKind::Concatenated(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| operation_eq(x, y, c))
        }
        _ => false,
    };
    kinds
        && optional_crs_eq(&a.source, &b.source, c)
        && optional_crs_eq(&a.target, &b.target, c)
}

fn optional_crs_eq(a: &Option<Arc<Crs>>, b: &Option<Arc<Crs>>, c: Criterion) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => crs_eq(x, y, c),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{AxisDirection, Metadata, PredefinedUnit, as_native};

    fn geographic(name: &str, lat_first: bool) -> Arc<Crs> {
        let ellipsoid = Arc::new(Ellipsoid {
            meta: Metadata::named("WGS 84"),
            semi_major: 6378137.0,
            unit: PredefinedUnit::Metre.unit(),
            shape: crate::native::object::EllipsoidShape::InverseFlattening(298.257223563),
        });
        let pm = Arc::new(PrimeMeridian {
            meta: Metadata::named("Greenwich"),
            longitude: 0.0,
            unit: PredefinedUnit::Degree.unit(),
        });
        let datum = Arc::new(Datum {
            meta: Metadata::named("World Geodetic System 1984"),
            anchor: None,
            kind: DatumKind::GeodeticReferenceFrame {
                ellipsoid,
                prime_meridian: pm,
            },
        });
        let lat = Arc::new(Axis::new(
            "Geodetic latitude",
            "Lat",
            AxisDirection::North,
            PredefinedUnit::Degree.unit(),
        ));
        let lon = Arc::new(Axis::new(
            "Geodetic longitude",
            "Lon",
            AxisDirection::East,
            PredefinedUnit::Degree.unit(),
        ));
        let axes = if lat_first { vec![lat, lon] } else { vec![lon, lat] };
        Arc::new(Crs::new(
            Metadata::named(name),
            CrsKind::Geographic {
                datum,
                cs: Arc::new(CoordinateSystem::new(CsKind::Ellipsoidal, axes)),
            },
        ))
    }

    #[test]
    fn names_matter_only_under_strict() {
        let a = as_native(&geographic("WGS 84", true));
        let b = as_native(&geographic("WGS84 renamed", true));
        assert!(!is_equivalent(&a, &b, Criterion::Strict));
        assert!(is_equivalent(&a, &b, Criterion::Equivalent));
    }

    #[test]
    fn axis_order_is_ignored_only_when_asked() {
        let a = as_native(&geographic("WGS 84", true));
        let b = as_native(&geographic("WGS 84", false));
        assert!(!is_equivalent(&a, &b, Criterion::Equivalent));
        assert!(is_equivalent(
            &a,
            &b,
            Criterion::EquivalentExceptAxisOrderGeographic
        ));
    }

    #[test]
    fn objects_of_different_types_never_match() {
        let crs = geographic("WGS 84", true);
        let datum = crs.datum().expect("datum").clone();
        assert!(!is_equivalent(
            &as_native(&crs),
            &as_native(&datum),
            Criterion::Equivalent
        ));
    }
}
