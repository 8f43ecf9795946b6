//! Formula dependency resolver
//!
//! Walks formula references depth-first from a starting cell and builds a
//! [`FormulaComponent`] tree, with cycle detection, external-reference
//! short-circuiting, bounded range expansion and a depth limit.
//!
//! # Example
//!
//! ```rust
//! use drillsheets::{WorkbookResolveExt, WorkbookSnapshot};
//!
//! let mut wb = WorkbookSnapshot::new();
//! wb.add_sheet("Sheet1").unwrap();
//! wb.set_formula("Sheet1", "A1", "=B1+C1", 20.0).unwrap();
//! wb.set_number("Sheet1", "B1", 10.0).unwrap();
//! wb.set_formula("Sheet1", "C1", "=D1*2", 10.0).unwrap();
//! wb.set_number("Sheet1", "D1", 5.0).unwrap();
//!
//! let root = wb.resolve("Sheet1", "A1", 2).unwrap().unwrap();
//! assert_eq!(root.dependencies.len(), 2);
//! assert_eq!(root.dependencies[1].dependencies[0].cell_reference, "Sheet1!D1");
//! ```

use crate::component::{FormulaComponent, Termination};
use ahash::AHashSet;
use drillsheets_core::{CellAddress, CellReference, RangeReference, Result, WorkbookSource};
use drillsheets_formula::{detect_external_reference, parse_formula};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How to treat a cell referenced from more than one place in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Resolve it again under every parent that references it
    #[default]
    ResolveFresh,
    /// Emit it once, under the first parent reached; later references are
    /// dropped
    FirstOccurrence,
}

/// Options for dependency resolution
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Depth at which formula cells stop being expanded (root is depth 0)
    pub max_depth: usize,
    /// Cells attempted per range reference before the rest are dropped
    pub max_range_cells: usize,
    /// Range cells with a smaller absolute value are pruned
    pub materiality_threshold: f64,
    pub duplicates: DuplicatePolicy,
    /// Once set, no further cells are visited and the pass unwinds
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_range_cells: 50,
            materiality_threshold: 0.01,
            duplicates: DuplicatePolicy::ResolveFresh,
            cancel: None,
        }
    }
}

impl ResolveOptions {
    /// Default options with a different depth limit
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

/// Statistics from a resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolveStats {
    /// Nodes in the returned tree
    pub nodes: usize,
    /// References cut because they pointed back up the current path
    pub cycles_skipped: usize,
    /// References dropped as already emitted (`FirstOccurrence` only)
    pub duplicates_skipped: usize,
    /// References to sheets or cells that could not be found
    pub missing: usize,
    /// Range references that hit the expansion cap
    pub ranges_truncated: usize,
    /// Range cells never attempted because of the cap
    pub cells_dropped: usize,
    /// Range cells removed as immaterial
    pub cells_pruned: usize,
    /// Formula cells left unexpanded because they link to another workbook
    pub external_leaves: usize,
    /// Formula cells left unexpanded at the depth limit
    pub depth_limited: usize,
    /// The pass stopped early on its cancel flag
    pub cancelled: bool,
}

/// A resolved tree with the statistics of the pass that built it
#[derive(Debug, Clone)]
pub struct Resolution {
    /// `None` when the starting sheet or cell could not be resolved
    pub root: Option<FormulaComponent>,
    pub stats: ResolveStats,
}

/// Extension trait adding dependency resolution to any workbook source
pub trait WorkbookResolveExt {
    /// Resolve a cell's dependency tree with default options and the given
    /// depth limit
    fn resolve(&self, sheet: &str, address: &str, max_depth: usize)
        -> Result<Option<FormulaComponent>>;

    /// Resolve a cell's dependency tree with custom options
    fn resolve_with_options(
        &self,
        sheet: &str,
        address: &str,
        options: &ResolveOptions,
    ) -> Result<Option<FormulaComponent>>;

    /// Resolve with custom options and report what the pass skipped
    fn resolve_with_stats(
        &self,
        sheet: &str,
        address: &str,
        options: &ResolveOptions,
    ) -> Result<Resolution>;

    /// Direct dependencies of a cell, resolved `depth` levels deep
    ///
    /// The starting cell itself is not returned; a missing cell yields an
    /// empty list.
    fn get_progressive_dependencies(
        &self,
        sheet: &str,
        address: &str,
        depth: usize,
    ) -> Result<Vec<FormulaComponent>>;
}

impl<W: WorkbookSource + ?Sized> WorkbookResolveExt for W {
    fn resolve(
        &self,
        sheet: &str,
        address: &str,
        max_depth: usize,
    ) -> Result<Option<FormulaComponent>> {
        self.resolve_with_options(sheet, address, &ResolveOptions::with_max_depth(max_depth))
    }

    fn resolve_with_options(
        &self,
        sheet: &str,
        address: &str,
        options: &ResolveOptions,
    ) -> Result<Option<FormulaComponent>> {
        Ok(self.resolve_with_stats(sheet, address, options)?.root)
    }

    fn resolve_with_stats(
        &self,
        sheet: &str,
        address: &str,
        options: &ResolveOptions,
    ) -> Result<Resolution> {
        let mut resolver = Resolver::new(self, options);
        let root = match CellAddress::parse(address) {
            Ok(start) => resolver.resolve_cell(sheet, &start, 0)?,
            Err(e) => {
                log::debug!("Cannot resolve '{}': {}", address, e);
                resolver.stats.missing += 1;
                None
            }
        };

        let mut stats = resolver.stats;
        stats.nodes = root.as_ref().map_or(0, FormulaComponent::node_count);
        log::debug!("Resolved {}!{}: {:?}", sheet, address, stats);

        Ok(Resolution { root, stats })
    }

    fn get_progressive_dependencies(
        &self,
        sheet: &str,
        address: &str,
        depth: usize,
    ) -> Result<Vec<FormulaComponent>> {
        Ok(self
            .resolve(sheet, address, depth)?
            .map(|root| root.dependencies)
            .unwrap_or_default())
    }
}

/// One traversal. `visiting` holds the cells on the current path and is
/// pushed and popped around each expansion.
struct Resolver<'a, W: ?Sized> {
    source: &'a W,
    options: &'a ResolveOptions,
    visiting: AHashSet<String>,
    emitted: AHashSet<String>,
    stats: ResolveStats,
}

impl<'a, W: WorkbookSource + ?Sized> Resolver<'a, W> {
    fn new(source: &'a W, options: &'a ResolveOptions) -> Self {
        Self {
            source,
            options,
            visiting: AHashSet::new(),
            emitted: AHashSet::new(),
            stats: ResolveStats::default(),
        }
    }

    /// Turn "does not exist" into `None`; anything else is a read failure
    fn found<T>(&mut self, result: Result<T>, what: &str) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                log::debug!("Skipping {}: {}", what, e);
                self.stats.missing += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn is_cancelled(&mut self) -> bool {
        let cancelled = self
            .options
            .cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed));
        if cancelled && !self.stats.cancelled {
            log::debug!("Resolution cancelled, unwinding");
            self.stats.cancelled = true;
        }
        cancelled
    }

    fn resolve_cell(
        &mut self,
        sheet: &str,
        address: &CellAddress,
        depth: usize,
    ) -> Result<Option<FormulaComponent>> {
        if self.is_cancelled() {
            return Ok(None);
        }

        let resolved_sheet = self.source.resolve_sheet_name(sheet);
        let Some(sheet) = self.found(resolved_sheet, sheet)? else {
            return Ok(None);
        };

        let local = address.local();
        let cell_id = format!("{}!{}", sheet, local);

        if self.visiting.contains(&cell_id) {
            log::warn!("Circular reference detected: {}", cell_id);
            self.stats.cycles_skipped += 1;
            return Ok(None);
        }
        if self.options.duplicates == DuplicatePolicy::FirstOccurrence
            && self.emitted.contains(&cell_id)
        {
            self.stats.duplicates_skipped += 1;
            return Ok(None);
        }

        let contents = self.source.read_cell(&sheet, &local);
        let Some(contents) = self.found(contents, &cell_id)? else {
            return Ok(None);
        };

        let mut node = FormulaComponent::new(
            cell_id.clone(),
            contents.value.unwrap_or(0.0),
            contents.formula,
        );

        if let Some(formula) = node.formula.clone() {
            if detect_external_reference(&formula) {
                log::info!("External reference in {}, not expanding", cell_id);
                self.stats.external_leaves += 1;
                node.terminate(Termination::ExternalReference);
            } else if depth >= self.options.max_depth {
                self.stats.depth_limited += 1;
                node.terminate(Termination::DepthLimit);
            } else {
                self.visiting.insert(cell_id.clone());
                let children = self.expand(&sheet, &formula, depth);
                self.visiting.remove(&cell_id);
                node.dependencies = children?;
            }
        }

        if self.options.duplicates == DuplicatePolicy::FirstOccurrence {
            self.emitted.insert(cell_id);
        }

        Ok(Some(node))
    }

    /// Resolve every reference of a formula one level below `depth`
    fn expand(
        &mut self,
        sheet: &str,
        formula: &str,
        depth: usize,
    ) -> Result<Vec<FormulaComponent>> {
        let mut children = Vec::new();

        for reference in parse_formula(formula) {
            match reference {
                CellReference::Cell(addr) => {
                    let target = addr.sheet.as_deref().unwrap_or(sheet);
                    if let Some(child) = self.resolve_cell(target, &addr, depth + 1)? {
                        children.push(child);
                    }
                }
                CellReference::Range(range) => {
                    self.expand_range(sheet, &range, depth + 1, &mut children)?;
                }
            }
        }

        Ok(children)
    }

    /// Expand a range row by row, up to the cell cap, keeping material cells
    fn expand_range(
        &mut self,
        sheet: &str,
        range: &RangeReference,
        depth: usize,
        out: &mut Vec<FormulaComponent>,
    ) -> Result<()> {
        let target = range.sheet().unwrap_or(sheet);
        let cap = self.options.max_range_cells;

        for (attempted, addr) in range.cells().enumerate() {
            if attempted >= cap {
                let total = range.cell_count();
                log::info!(
                    "Range {} has {} cells, expanding only the first {}",
                    range,
                    total,
                    cap
                );
                self.stats.ranges_truncated += 1;
                self.stats.cells_dropped += usize::try_from(total)
                    .unwrap_or(usize::MAX)
                    .saturating_sub(cap);
                break;
            }

            match self.resolve_cell(target, &addr, depth)? {
                Some(cell) if cell.value.abs() >= self.options.materiality_threshold => {
                    out.push(cell)
                }
                Some(cell) => {
                    log::debug!("Pruning immaterial range cell {}", cell.cell_reference);
                    self.stats.cells_pruned += 1;
                }
                None => {}
            }
        }

        Ok(())
    }
}
