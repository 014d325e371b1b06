//! Purpose: Search and rank coordinate operations between two CRSs.
//! Exports: `OperationContext`, policy enums, `create_operations`.
//! Role: Native operation factory; the bridge keeps only the first-ranked result.
//! Invariants: Ranking is descending area coverage, ascending accuracy (unknown last), then
//! fewer steps. Ballpark operations appear only when no catalog transformation applies.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use super::catalog::{CatalogOperation, Database};
use super::compare::same_datum;
use super::object::{Crs, CrsKind, Datum, Extent, Metadata, downcast};
use super::operation::{
    CoordinateOperation, MethodFormula, OperationKind, OperationMethod, SingleOperation,
};
use super::{NativeError, NativeResult};

/// How the source and target CRS extents feed the area of interest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SourceTargetExtentUse {
    /// Ignore CRS extents.
    None,
    /// Operations must cover both extents.
    Both,
    #[default]
    Intersection,
    Smallest,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SpatialCriterion {
    #[default]
    StrictContainment,
    PartialIntersection,
}

/// Treatment of operations whose method cannot be instantiated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GridAvailabilityUse {
    #[default]
    UseForSorting,
    DiscardIfMissing,
    Ignore,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IntermediateCrsUse {
    Always,
    #[default]
    IfNoDirectTransformation,
    Never,
}

/// Search parameters for `create_operations`.
#[derive(Clone, Debug)]
pub struct OperationContext {
    pub area_of_interest: Option<Extent>,
    /// Maximum accuracy in metres; 0 accepts any.
    pub desired_accuracy: f64,
    pub source_target_extent_use: SourceTargetExtentUse,
    pub spatial_criterion: SpatialCriterion,
    pub grid_availability_use: GridAvailabilityUse,
    pub intermediate_crs_use: IntermediateCrsUse,
    pub discard_superseded: bool,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self {
            area_of_interest: None,
            desired_accuracy: 0.0,
            source_target_extent_use: SourceTargetExtentUse::default(),
            spatial_criterion: SpatialCriterion::default(),
            grid_availability_use: GridAvailabilityUse::default(),
            intermediate_crs_use: IntermediateCrsUse::default(),
            discard_superseded: true,
        }
    }
}

/// Geodetic CRS a CRS is expressed in, with the conversions leading to and from it.
struct Reduced {
    root: Arc<Crs>,
    to_root: Option<Arc<CoordinateOperation>>,
    from_root: Option<Arc<CoordinateOperation>>,
}

fn reduce(crs: &Arc<Crs>) -> NativeResult<Reduced> {
    match &crs.kind {
        CrsKind::Projected {
            base, conversion, ..
        } => {
            let inner = reduce(base)?;
            let forward = Arc::new(conversion.between(Arc::clone(base), Arc::clone(crs)));
            let inverse = Arc::new(forward.inverse()?);
            Ok(Reduced {
                root: inner.root,
                to_root: Some(inverse),
                from_root: Some(forward),
            })
        }
        CrsKind::Compound { components } => match components.first() {
            Some(first) => reduce(first),
            None => Err(NativeError::InvalidArgument(format!(
                "{} has no components",
                crs.meta.name
            ))),
        },
        _ => Ok(Reduced {
            root: Arc::clone(crs),
            to_root: None,
            from_root: None,
        }),
    }
}

struct Candidate {
    steps: Vec<Arc<CoordinateOperation>>,
    superseded: bool,
    uses_intermediate: bool,
}

/// Operations transforming `source` into `target`, best first.
pub fn create_operations(
    source: &Arc<Crs>,
    target: &Arc<Crs>,
    context: &OperationContext,
    database: &Database,
) -> NativeResult<Vec<Arc<CoordinateOperation>>> {
    let from = reduce(source)?;
    let to = reduce(target)?;
    let (Some(source_datum), Some(target_datum)) = (from.root.datum(), to.root.datum()) else {
        return Ok(Vec::new());
    };
    if source_datum.ellipsoid().is_some() != target_datum.ellipsoid().is_some() {
        debug!(source = %source.meta.name, target = %target.meta.name, "no operation between geodetic and non-geodetic CRSs");
        return Ok(Vec::new());
    }

    let middles = datum_changes(&from.root, &to.root, source_datum, target_datum, context, database)?;
    let explicit = context.area_of_interest;
    let aoi = explicit.or_else(|| crs_extent(source, target, context.source_target_extent_use));
    let mut ranked: Vec<(Candidate, Arc<CoordinateOperation>, Option<Extent>)> = Vec::new();
    for middle in middles {
        let mut steps = Vec::new();
        steps.extend(from.to_root.iter().cloned());
        steps.extend(middle.steps);
        steps.extend(to.from_root.iter().cloned());
        let candidate = Candidate {
            steps,
            superseded: middle.superseded,
            uses_intermediate: middle.uses_intermediate,
        };
        let operation = Arc::new(assemble(&candidate.steps, source, target));
        let extent = operation
            .meta
            .area
            .or_else(|| crs_extent(source, target, SourceTargetExtentUse::Intersection));
        ranked.push((candidate, operation, extent));
    }

    ranked.retain(|(candidate, operation, extent)| {
        if context.discard_superseded && candidate.superseded {
            return false;
        }
        if context.desired_accuracy > 0.0
            && operation
                .accuracy
                .is_none_or(|accuracy| accuracy > context.desired_accuracy)
        {
            return false;
        }
        if context.grid_availability_use == GridAvailabilityUse::DiscardIfMissing
            && !instantiable(operation)
        {
            return false;
        }
        match (explicit, extent) {
            (Some(aoi), Some(extent)) => match context.spatial_criterion {
                SpatialCriterion::StrictContainment => extent.contains(&aoi),
                SpatialCriterion::PartialIntersection => extent.intersection(&aoi).is_some(),
            },
            _ => true,
        }
    });

    let coverage = |extent: &Option<Extent>| match (aoi, extent) {
        (Some(aoi), Some(extent)) => extent.intersection(&aoi).map_or(0.0, |e| e.area()),
        (None, Some(extent)) => extent.area(),
        _ => 0.0,
    };
    ranked.sort_by(|(ca, a, ea), (cb, b, eb)| {
        let grid = if context.grid_availability_use == GridAvailabilityUse::UseForSorting {
            instantiable(b).cmp(&instantiable(a))
        } else {
            Ordering::Equal
        };
        grid.then_with(|| {
            coverage(eb)
                .partial_cmp(&coverage(ea))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| compare_accuracy(a.accuracy, b.accuracy))
        .then_with(|| ca.uses_intermediate.cmp(&cb.uses_intermediate))
        .then_with(|| a.step_count().cmp(&b.step_count()))
    });
    debug!(
        source = %source.meta.name,
        target = %target.meta.name,
        found = ranked.len(),
        "operation search finished"
    );
    Ok(ranked.into_iter().map(|(_, operation, _)| operation).collect())
}

fn compare_accuracy(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn instantiable(operation: &CoordinateOperation) -> bool {
    match &operation.kind {
        OperationKind::Concatenated(steps) => steps.iter().all(|s| instantiable(s)),
        _ => operation
            .method()
            .is_some_and(|m| m.formula != MethodFormula::Unknown),
    }
}

fn crs_extent(source: &Crs, target: &Crs, usage: SourceTargetExtentUse) -> Option<Extent> {
    let (a, b) = (source.meta.area, target.meta.area);
    match usage {
        SourceTargetExtentUse::None => None,
        SourceTargetExtentUse::Intersection | SourceTargetExtentUse::Both => match (a, b) {
            (Some(a), Some(b)) => a.intersection(&b),
            (a, b) => a.or(b),
        },
        SourceTargetExtentUse::Smallest => match (a, b) {
            (Some(a), Some(b)) => Some(if a.area() <= b.area() { a } else { b }),
            (a, b) => a.or(b),
        },
    }
}

/// Steps between the two geodetic roots.
fn datum_changes(
    source: &Arc<Crs>,
    target: &Arc<Crs>,
    source_datum: &Datum,
    target_datum: &Datum,
    context: &OperationContext,
    database: &Database,
) -> NativeResult<Vec<Candidate>> {
    if same_datum(source_datum, target_datum) {
        let steps = if source.is_geocentric() != target.is_geocentric() {
            let single = SingleOperation::new(OperationMethod::epsg(9602), Vec::new());
            let conversion = CoordinateOperation::conversion(
                Metadata::named("Conversion from geographic to geocentric"),
                single,
            );
            vec![Arc::new(conversion.between(Arc::clone(source), Arc::clone(target)))]
        } else {
            Vec::new()
        };
        return Ok(vec![Candidate {
            steps,
            superseded: false,
            uses_intermediate: false,
        }]);
    }

    let catalog = database.transformations()?;
    let mut out = Vec::new();
    for entry in &catalog {
        if let Some(step) = oriented(entry, source_datum, target_datum, source, target)? {
            out.push(Candidate {
                steps: vec![step],
                superseded: entry.superseded,
                uses_intermediate: false,
            });
        }
    }

    let wanted = match context.intermediate_crs_use {
        IntermediateCrsUse::Always => true,
        IntermediateCrsUse::IfNoDirectTransformation => out.is_empty(),
        IntermediateCrsUse::Never => false,
    };
    if wanted && let Some(pivot) = pivot_crs(database) {
        out.extend(via_pivot(&catalog, source, target, &pivot)?);
    }

    if out.is_empty() {
        out.push(Candidate {
            steps: vec![Arc::new(ballpark(source, target))],
            superseded: false,
            uses_intermediate: false,
        });
    }
    Ok(out)
}

/// Catalog transformation bound to `source` and `target`, inverted when it runs the other way.
fn oriented(
    entry: &CatalogOperation,
    source_datum: &Datum,
    target_datum: &Datum,
    source: &Arc<Crs>,
    target: &Arc<Crs>,
) -> NativeResult<Option<Arc<CoordinateOperation>>> {
    let op = &entry.operation;
    let (Some(from), Some(to)) = (
        op.source.as_ref().and_then(|c| c.datum()),
        op.target.as_ref().and_then(|c| c.datum()),
    ) else {
        return Ok(None);
    };
    if same_datum(from, source_datum) && same_datum(to, target_datum) {
        return Ok(Some(Arc::new(op.between(Arc::clone(source), Arc::clone(target)))));
    }
    if same_datum(from, target_datum) && same_datum(to, source_datum) {
        let inverse = match op.inverse() {
            Ok(inverse) => inverse,
            Err(NativeError::NoInverse(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        return Ok(Some(Arc::new(
            inverse.between(Arc::clone(source), Arc::clone(target)),
        )));
    }
    Ok(None)
}

fn pivot_crs(database: &Database) -> Option<Arc<Crs>> {
    database
        .lookup("EPSG", "4326")
        .ok()
        .and_then(|object| downcast::<Crs>(&object))
}

fn via_pivot(
    catalog: &[CatalogOperation],
    source: &Arc<Crs>,
    target: &Arc<Crs>,
    pivot: &Arc<Crs>,
) -> NativeResult<Vec<Candidate>> {
    let (Some(source_datum), Some(target_datum), Some(pivot_datum)) =
        (source.datum(), target.datum(), pivot.datum())
    else {
        return Ok(Vec::new());
    };
    if same_datum(source_datum, pivot_datum) || same_datum(target_datum, pivot_datum) {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for first in catalog {
        let Some(a) = oriented(first, source_datum, pivot_datum, source, pivot)? else {
            continue;
        };
        for second in catalog {
            let Some(b) = oriented(second, pivot_datum, target_datum, pivot, target)? else {
                continue;
            };
            out.push(Candidate {
                steps: vec![Arc::clone(&a), b],
                superseded: first.superseded || second.superseded,
                uses_intermediate: true,
            });
        }
    }
    Ok(out)
}

fn ballpark(source: &Arc<Crs>, target: &Arc<Crs>) -> CoordinateOperation {
    let name = format!(
        "Ballpark geographic offset from {} to {}",
        source.meta.name, target.meta.name
    );
    let single = SingleOperation::new(OperationMethod::ballpark("Ballpark geographic offset"), Vec::new());
    CoordinateOperation::transformation(
        Metadata::named(name),
        single,
        Arc::clone(source),
        Arc::clone(target),
        None,
    )
}

/// Single operation or concatenation of `steps`, bound to the caller's CRSs.
fn assemble(
    steps: &[Arc<CoordinateOperation>],
    source: &Arc<Crs>,
    target: &Arc<Crs>,
) -> CoordinateOperation {
    match steps {
        [] => {
            let method = OperationMethod::new(Metadata::named("Null geographic offset"), MethodFormula::Identity);
            CoordinateOperation::conversion(
                Metadata::named(format!(
                    "Null geographic offset from {} to {}",
                    source.meta.name, target.meta.name
                )),
                SingleOperation::new(Arc::new(method), Vec::new()),
            )
            .between(Arc::clone(source), Arc::clone(target))
        }
        [single] => single.between(Arc::clone(source), Arc::clone(target)),
        _ => {
            let name = steps
                .iter()
                .map(|s| s.meta.name.as_str())
                .collect::<Vec<_>>()
                .join(" + ");
            let accuracy = steps
                .iter()
                .try_fold(0.0, |sum, s| s.accuracy.map(|a| sum + a));
            let area = steps
                .iter()
                .filter_map(|s| s.meta.area)
                .try_fold(None, |acc: Option<Extent>, e| match acc {
                    None => Some(Some(e)),
                    Some(acc) => acc.intersection(&e).map(Some),
                })
                .flatten();
            let meta = Metadata {
                area,
                ..Metadata::named(name)
            };
            CoordinateOperation {
                meta,
                kind: OperationKind::Concatenated(steps.to_vec()),
                source: Some(Arc::clone(source)),
                target: Some(Arc::clone(target)),
                accuracy,
                version: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::pj::Pipeline;

    fn crs(database: &Database, code: &str) -> Arc<Crs> {
        downcast::<Crs>(&database.lookup("EPSG", code).expect("lookup")).expect("crs")
    }

    #[test]
    fn projection_from_geographic_is_the_catalog_conversion() {
        let database = Database::builtin();
        let (wgs84, merc) = (crs(&database, "4326"), crs(&database, "3857"));
        let ops = create_operations(&wgs84, &merc, &OperationContext::default(), &database)
            .expect("search");
        let first = ops.first().expect("operation");
        assert_eq!(first.meta.name, "Popular Visualisation Pseudo-Mercator");
        assert_eq!(first.meta.epsg_code(), Some(3856));
        let pipeline = Pipeline::compile(first).expect("compile");
        let mut coords = [45.0, 10.0];
        pipeline.transform(2, &mut coords, 0, 1).expect("transform");
        assert!((coords[0] - 1113194.9079327357).abs() < 1e-6);
    }

    #[test]
    fn area_of_interest_prefers_the_more_accurate_regional_transformation() {
        let database = Database::builtin();
        let (ed50, wgs84) = (crs(&database, "4230"), crs(&database, "4326"));
        let wide = create_operations(&ed50, &wgs84, &OperationContext::default(), &database)
            .expect("search");
        assert_eq!(wide[0].meta.epsg_code(), Some(1133));

        let france = OperationContext {
            area_of_interest: Some(Extent::new(2.0, 46.0, 3.0, 47.0)),
            ..OperationContext::default()
        };
        let ops = create_operations(&ed50, &wgs84, &france, &database).expect("search");
        let codes: Vec<_> = ops.iter().map(|o| o.meta.epsg_code()).collect();
        assert_eq!(codes, vec![Some(1275), Some(1133)]);

        let strict = OperationContext {
            desired_accuracy: 5.0,
            ..OperationContext::default()
        };
        let ops = create_operations(&ed50, &wgs84, &strict, &database).expect("search");
        assert!(ops.iter().all(|o| o.accuracy.is_some_and(|a| a <= 5.0)));
    }

    #[test]
    fn reverse_direction_inverts_and_pivots_chain() {
        let database = Database::builtin();
        let (ed50, wgs84, etrs89) = (
            crs(&database, "4230"),
            crs(&database, "4326"),
            crs(&database, "4258"),
        );
        let back = create_operations(&wgs84, &ed50, &OperationContext::default(), &database)
            .expect("search");
        assert!(back[0].meta.name.starts_with("Inverse of ED50 to WGS 84"));

        let chained = create_operations(&ed50, &etrs89, &OperationContext::default(), &database)
            .expect("search");
        let first = &chained[0];
        assert!(matches!(&first.kind, OperationKind::Concatenated(steps) if steps.len() == 2));
        assert!(!first.is_ballpark());
        Pipeline::compile(first).expect("compile");

        let never = OperationContext {
            intermediate_crs_use: IntermediateCrsUse::Never,
            ..OperationContext::default()
        };
        let ops = create_operations(&ed50, &etrs89, &never, &database).expect("search");
        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_ballpark());
    }

    #[test]
    fn same_datum_gives_a_conversion_or_a_null_offset() {
        let database = Database::builtin();
        let (wgs84, geocentric, utm) = (
            crs(&database, "4326"),
            crs(&database, "4978"),
            crs(&database, "32631"),
        );
        let ops = create_operations(&wgs84, &geocentric, &OperationContext::default(), &database)
            .expect("search");
        assert_eq!(ops[0].method().map(|m| m.formula), Some(MethodFormula::GeographicGeocentric));

        let ops = create_operations(&wgs84, &wgs84, &OperationContext::default(), &database)
            .expect("search");
        assert_eq!(Pipeline::compile(&ops[0]).expect("compile").proj_string().expect("proj"), "+proj=noop");

        let ops = create_operations(&utm, &geocentric, &OperationContext::default(), &database)
            .expect("search");
        assert_eq!(ops[0].step_count(), 2);
    }

    #[test]
    fn vertical_and_geodetic_have_no_operation() {
        let database = Database::builtin();
        let ops = create_operations(
            &crs(&database, "4326"),
            &crs(&database, "3855"),
            &OperationContext::default(),
            &database,
        )
        .expect("search");
        assert!(ops.is_empty());
    }
}
