//! Purpose: Map a native object's capabilities to the most specific managed type tag.
//! Exports: `TypeTag`, `resolve`.
//! Role: Pure function consulted by the identity cache before a wrapper is built.
//! Invariants: The check order within each branch is fixed; the first match wins.
//! Invariants: Resolution never returns a tag coarser than the one it started from,
//! and stops after at most `MAX_DEPTH` refinements.

use crate::native::{Capability, CapabilitySet};

/// Managed type tags with their stable ABI codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(i32)]
pub enum TypeTag {
    Any = 0,
    Identifier = 1,
    UnitOfMeasure = 2,
    Axis = 3,
    CoordinateSystem = 4,
    CartesianCs = 5,
    SphericalCs = 6,
    VerticalCs = 7,
    TemporalCs = 8,
    EllipsoidalCs = 9,
    Ellipsoid = 10,
    PrimeMeridian = 11,
    Datum = 12,
    GeodeticReferenceFrame = 13,
    GeodeticCrs = 14,
    GeographicCrs = 15,
    GeocentricCrs = 16,
    ProjectedCrs = 17,
    VerticalReferenceFrame = 18,
    VerticalCrs = 19,
    TemporalDatum = 20,
    TemporalCrs = 21,
    EngineeringDatum = 22,
    EngineeringCrs = 23,
    CompoundCrs = 24,
    CoordinateReferenceSystem = 25,
    CoordinateOperation = 26,
    OperationMethod = 27,
    Conversion = 28,
    Transformation = 29,
}

const MAX_DEPTH: usize = 3;

const FROM_ANY: &[TypeTag] = &[
    TypeTag::CoordinateReferenceSystem,
    TypeTag::Datum,
    TypeTag::Ellipsoid,
    TypeTag::PrimeMeridian,
    TypeTag::CoordinateSystem,
    TypeTag::Axis,
    TypeTag::CoordinateOperation,
    TypeTag::OperationMethod,
    TypeTag::UnitOfMeasure,
    TypeTag::Identifier,
];

const FROM_OPERATION: &[TypeTag] = &[TypeTag::Conversion, TypeTag::Transformation];

const FROM_CRS: &[TypeTag] = &[
    TypeTag::CompoundCrs,
    TypeTag::ProjectedCrs,
    TypeTag::GeographicCrs,
    TypeTag::VerticalCrs,
    TypeTag::TemporalCrs,
    TypeTag::EngineeringCrs,
    TypeTag::GeodeticCrs,
];

const FROM_GEODETIC: &[TypeTag] = &[TypeTag::GeocentricCrs];

const FROM_CS: &[TypeTag] = &[
    TypeTag::CartesianCs,
    TypeTag::SphericalCs,
    TypeTag::EllipsoidalCs,
    TypeTag::VerticalCs,
    TypeTag::TemporalCs,
];

const FROM_DATUM: &[TypeTag] = &[
    TypeTag::GeodeticReferenceFrame,
    TypeTag::VerticalReferenceFrame,
    TypeTag::TemporalDatum,
    TypeTag::EngineeringDatum,
];

impl TypeTag {
    pub const ALL: [TypeTag; 30] = [
        TypeTag::Any,
        TypeTag::Identifier,
        TypeTag::UnitOfMeasure,
        TypeTag::Axis,
        TypeTag::CoordinateSystem,
        TypeTag::CartesianCs,
        TypeTag::SphericalCs,
        TypeTag::VerticalCs,
        TypeTag::TemporalCs,
        TypeTag::EllipsoidalCs,
        TypeTag::Ellipsoid,
        TypeTag::PrimeMeridian,
        TypeTag::Datum,
        TypeTag::GeodeticReferenceFrame,
        TypeTag::GeodeticCrs,
        TypeTag::GeographicCrs,
        TypeTag::GeocentricCrs,
        TypeTag::ProjectedCrs,
        TypeTag::VerticalReferenceFrame,
        TypeTag::VerticalCrs,
        TypeTag::TemporalDatum,
        TypeTag::TemporalCrs,
        TypeTag::EngineeringDatum,
        TypeTag::EngineeringCrs,
        TypeTag::CompoundCrs,
        TypeTag::CoordinateReferenceSystem,
        TypeTag::CoordinateOperation,
        TypeTag::OperationMethod,
        TypeTag::Conversion,
        TypeTag::Transformation,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Next coarser tag in the lattice; `None` for `Any`.
    pub fn parent(self) -> Option<Self> {
        use TypeTag::*;
        match self {
            Any => None,
            CoordinateReferenceSystem | Datum | Ellipsoid | PrimeMeridian | CoordinateSystem
            | Axis | CoordinateOperation | OperationMethod | UnitOfMeasure | Identifier => Some(Any),
            CompoundCrs | ProjectedCrs | GeographicCrs | VerticalCrs | TemporalCrs
            | EngineeringCrs | GeodeticCrs => Some(CoordinateReferenceSystem),
            GeocentricCrs => Some(GeodeticCrs),
            CartesianCs | SphericalCs | EllipsoidalCs | VerticalCs | TemporalCs => {
                Some(CoordinateSystem)
            }
            GeodeticReferenceFrame | VerticalReferenceFrame | TemporalDatum | EngineeringDatum => {
                Some(Datum)
            }
            Conversion | Transformation => Some(CoordinateOperation),
        }
    }

    /// Distance from `Any` in the lattice.
    pub fn depth(self) -> usize {
        let mut depth = 0;
        let mut tag = self;
        while let Some(parent) = tag.parent() {
            depth += 1;
            tag = parent;
        }
        depth
    }

    /// True when `self` is `other` or a descendant of it.
    pub fn is_refinement_of(self, other: TypeTag) -> bool {
        let mut tag = Some(self);
        while let Some(current) = tag {
            if current == other {
                return true;
            }
            tag = current.parent();
        }
        false
    }

    /// Capability an object must carry to be wrapped with this tag.
    pub fn required_capability(self) -> Option<Capability> {
        use TypeTag::*;
        Some(match self {
            Any => return None,
            Identifier => Capability::Identifier,
            UnitOfMeasure => Capability::UnitOfMeasure,
            Axis => Capability::Axis,
            CoordinateSystem => Capability::CoordinateSystem,
            CartesianCs => Capability::CartesianCs,
            SphericalCs => Capability::SphericalCs,
            VerticalCs => Capability::VerticalCs,
            TemporalCs => Capability::TemporalCs,
            EllipsoidalCs => Capability::EllipsoidalCs,
            Ellipsoid => Capability::Ellipsoid,
            PrimeMeridian => Capability::PrimeMeridian,
            Datum => Capability::Datum,
            GeodeticReferenceFrame => Capability::GeodeticReferenceFrame,
            GeodeticCrs => Capability::GeodeticCrs,
            GeographicCrs => Capability::GeographicCrs,
            GeocentricCrs => Capability::Geocentric,
            ProjectedCrs => Capability::ProjectedCrs,
            VerticalReferenceFrame => Capability::VerticalReferenceFrame,
            VerticalCrs => Capability::VerticalCrs,
            TemporalDatum => Capability::TemporalDatum,
            TemporalCrs => Capability::TemporalCrs,
            EngineeringDatum => Capability::EngineeringDatum,
            EngineeringCrs => Capability::EngineeringCrs,
            CompoundCrs => Capability::CompoundCrs,
            CoordinateReferenceSystem => Capability::Crs,
            CoordinateOperation => Capability::CoordinateOperation,
            OperationMethod => Capability::OperationMethod,
            Conversion => Capability::Conversion,
            Transformation => Capability::Transformation,
        })
    }

    fn refinements(self) -> &'static [TypeTag] {
        match self {
            TypeTag::Any => FROM_ANY,
            TypeTag::CoordinateOperation => FROM_OPERATION,
            TypeTag::CoordinateReferenceSystem => FROM_CRS,
            TypeTag::GeodeticCrs => FROM_GEODETIC,
            TypeTag::CoordinateSystem => FROM_CS,
            TypeTag::Datum => FROM_DATUM,
            _ => &[],
        }
    }
}

/// Most specific tag reachable from `coarse` for an object with `capabilities`.
pub fn resolve(capabilities: CapabilitySet, coarse: TypeTag) -> TypeTag {
    let mut tag = coarse;
    for _ in 0..MAX_DEPTH {
        let next = tag.refinements().iter().copied().find(|candidate| {
            candidate
                .required_capability()
                .is_some_and(|cap| capabilities.contains(cap))
        });
        match next {
            Some(next) => tag = next,
            None => break,
        }
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_dense() {
        for (index, tag) in TypeTag::ALL.iter().enumerate() {
            assert_eq!(tag.code(), index as i32);
            assert_eq!(TypeTag::from_code(index as i32), Some(*tag));
        }
        assert_eq!(TypeTag::Transformation.code(), 29);
        assert_eq!(TypeTag::from_code(30), None);
        assert_eq!(TypeTag::from_code(-1), None);
    }

    #[test]
    fn geographic_wins_over_geodetic() {
        let caps = CapabilitySet::of(&[
            Capability::Crs,
            Capability::SingleCrs,
            Capability::GeodeticCrs,
            Capability::GeographicCrs,
        ]);
        assert_eq!(resolve(caps, TypeTag::Any), TypeTag::GeographicCrs);
        assert_eq!(resolve(caps, TypeTag::GeodeticCrs), TypeTag::GeodeticCrs);
    }

    #[test]
    fn geocentric_takes_three_steps() {
        let caps = CapabilitySet::of(&[
            Capability::Crs,
            Capability::GeodeticCrs,
            Capability::Geocentric,
        ]);
        assert_eq!(resolve(caps, TypeTag::Any), TypeTag::GeocentricCrs);
        assert_eq!(TypeTag::GeocentricCrs.depth(), 3);
    }

    #[test]
    fn unmatched_objects_keep_their_tag() {
        assert_eq!(resolve(CapabilitySet::EMPTY, TypeTag::Any), TypeTag::Any);
        let datum_only = CapabilitySet::of(&[Capability::Datum]);
        assert_eq!(resolve(datum_only, TypeTag::Any), TypeTag::Datum);
        let caps = CapabilitySet::of(&[Capability::Ellipsoid]);
        assert_eq!(resolve(caps, TypeTag::CoordinateOperation), TypeTag::CoordinateOperation);
    }

    #[test]
    fn resolution_is_monotonic_for_every_capability_mix() {
        for cap in Capability::ALL {
            let caps = CapabilitySet::of(&[cap, Capability::Crs, Capability::CoordinateSystem]);
            for coarse in TypeTag::ALL {
                let resolved = resolve(caps, coarse);
                assert!(resolved.is_refinement_of(coarse), "{coarse:?} -> {resolved:?}");
                assert!(resolved.depth() <= MAX_DEPTH);
            }
        }
    }
}
