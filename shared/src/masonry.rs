//! Masonry ("waterfall") layout: packs variable-height cards into equal-width
//! columns, always placing the next card into the currently shortest column.
//!
//! The engine is pure. The browser component feeds it container widths and
//! measured card heights and reads back positions; nothing here touches the DOM.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasonryConfig {
    /// Spacing between columns and between stacked cards, in px.
    pub gap: f64,
    pub min_column_width: f64,
    pub max_columns: usize,
    /// Height assumed for a card that has not been measured yet.
    pub fallback_height: f64,
    /// Distance from the document bottom at which more items are requested.
    pub load_more_threshold: f64,
}

impl Default for MasonryConfig {
    fn default() -> Self {
        Self {
            gap: 16.0,
            min_column_width: 280.0,
            max_columns: 4,
            fallback_height: 400.0,
            load_more_threshold: 1000.0,
        }
    }
}

/// Clamps NaN, infinities and negatives to zero.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// `clamp(floor((width + gap) / (min_column_width + gap)), 1, max_columns)`
pub fn column_count(container_width: f64, min_column_width: f64, gap: f64, max_columns: usize) -> usize {
    let fit = ((sanitize(container_width) + gap) / (min_column_width + gap)).floor();
    if !fit.is_finite() || fit < 1.0 {
        return 1;
    }
    (fit as usize).clamp(1, max_columns.max(1))
}

pub fn column_width(container_width: f64, columns: usize, gap: f64) -> f64 {
    let columns = columns.max(1);
    let gutters = gap * (columns - 1) as f64;
    sanitize((container_width - gutters) / columns as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    pub positions: HashMap<String, Position>,
    /// Running total per column, each including the trailing gap.
    pub column_heights: Vec<f64>,
}

/// Index of the first column with the minimum height.
fn shortest_column(heights: &[f64]) -> usize {
    let mut best = 0;
    for (i, h) in heights.iter().enumerate().skip(1) {
        if *h < heights[best] {
            best = i;
        }
    }
    best
}

/// One greedy pass over `items` in order. Never revisits an earlier choice.
pub fn place<'a, I>(items: I, columns: usize, column_width: f64, gap: f64) -> Placement
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let columns = columns.max(1);
    let mut column_heights = vec![0.0; columns];
    let mut positions = HashMap::new();

    for (id, height) in items {
        let target = shortest_column(&column_heights);
        positions.insert(
            id.to_string(),
            Position {
                x: target as f64 * (column_width + gap),
                y: column_heights[target],
                column: target,
            },
        );
        column_heights[target] = sanitize(column_heights[target] + sanitize(height) + gap);
    }

    Placement {
        positions,
        column_heights,
    }
}

/// Stamp of a scheduled measurement pass. Only the latest one may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// A newer pass was scheduled after this one; nothing was applied.
    Stale,
    /// The container has no width yet.
    NoWidth,
    /// Provisional positions were computed, but some items are unmeasured.
    Pending { unmeasured: usize },
    Ready,
}

#[derive(Debug, Clone)]
pub struct MasonryLayout {
    config: MasonryConfig,
    container_width: f64,
    columns: usize,
    items: Vec<String>,
    heights: HashMap<String, f64>,
    placement: Placement,
    ready: bool,
    generation: u64,
}

impl MasonryLayout {
    pub fn new(config: MasonryConfig) -> Self {
        Self {
            config,
            container_width: 0.0,
            columns: 1,
            items: Vec::new(),
            heights: HashMap::new(),
            placement: Placement::default(),
            ready: false,
            generation: 0,
        }
    }

    pub fn config(&self) -> &MasonryConfig {
        &self.config
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn column_width(&self) -> f64 {
        column_width(self.container_width, self.columns, self.config.gap)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    /// Records a new container width. Returns `true` when the column count
    /// changed, in which case every position is dropped until remeasured.
    pub fn resize(&mut self, container_width: f64) -> bool {
        let width = sanitize(container_width);
        if width == self.container_width {
            return false;
        }
        self.container_width = width;
        self.generation += 1;

        let columns = column_count(
            width,
            self.config.min_column_width,
            self.config.gap,
            self.config.max_columns,
        );
        if columns == self.columns {
            return false;
        }
        self.columns = columns;
        self.placement = Placement::default();
        self.ready = false;
        true
    }

    /// Replaces the item list. Heights of items no longer present are purged.
    pub fn set_items<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.items = ids.into_iter().collect();
        let live: HashSet<&str> = self.items.iter().map(String::as_str).collect();
        self.heights.retain(|id, _| live.contains(id.as_str()));
        self.placement.positions.retain(|id, _| live.contains(id.as_str()));
        self.generation += 1;

        if self.items.iter().any(|id| !self.heights.contains_key(id)) {
            self.ready = false;
        }
    }

    /// Starts a measurement pass, superseding any pass scheduled earlier.
    pub fn schedule(&mut self) -> Generation {
        self.generation += 1;
        Generation(self.generation)
    }

    /// Commits the measurements of a pass and recomputes every position.
    ///
    /// Heights that are not finite and positive leave the item unmeasured.
    pub fn apply<I>(&mut self, generation: Generation, measurements: I) -> PassOutcome
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        if generation.0 != self.generation {
            return PassOutcome::Stale;
        }

        for (id, height) in measurements {
            if !(height.is_finite() && height > 0.0) {
                continue;
            }
            if self.items.iter().any(|known| *known == id) {
                self.heights.insert(id, height);
            }
        }

        self.relayout()
    }

    fn relayout(&mut self) -> PassOutcome {
        let column_width = self.column_width();
        if column_width <= 0.0 {
            return PassOutcome::NoWidth;
        }

        let fallback = self.config.fallback_height;
        let heights = &self.heights;
        self.placement = place(
            self.items.iter().map(|id| {
                let height = heights.get(id).copied().unwrap_or(fallback);
                (id.as_str(), height)
            }),
            self.columns,
            column_width,
            self.config.gap,
        );

        let unmeasured = self
            .items
            .iter()
            .filter(|id| !self.heights.contains_key(*id))
            .count();
        if unmeasured > 0 {
            self.ready = false;
            return PassOutcome::Pending { unmeasured };
        }

        self.ready = true;
        PassOutcome::Ready
    }

    /// Gives every still-unmeasured item the fallback height and commits.
    /// Used once measurement retries run out.
    pub fn commit_fallback(&mut self, generation: Generation) -> PassOutcome {
        if generation.0 != self.generation {
            return PassOutcome::Stale;
        }
        let fallback = self.config.fallback_height;
        for id in &self.items {
            self.heights.entry(id.clone()).or_insert(fallback);
        }
        self.relayout()
    }

    pub fn is_measured(&self, id: &str) -> bool {
        self.heights.contains_key(id)
    }

    /// Whether the item's committed position is final: it and every item
    /// placed before it have a measured height.
    pub fn is_settled(&self, id: &str) -> bool {
        if !self.placement.positions.contains_key(id) {
            return false;
        }
        for item in &self.items {
            if !self.heights.contains_key(item) {
                return false;
            }
            if item == id {
                return true;
            }
        }
        false
    }

    pub fn position(&self, id: &str) -> Option<Position> {
        self.placement.positions.get(id).copied()
    }

    pub fn column_heights(&self) -> &[f64] {
        &self.placement.column_heights
    }

    /// Height of the tallest column without its trailing gap.
    pub fn container_height(&self) -> f64 {
        let tallest = self
            .placement
            .column_heights
            .iter()
            .copied()
            .fold(0.0, f64::max);
        sanitize(tallest - self.config.gap)
    }
}

/// Whether the viewport bottom is within `threshold` px of the document end
/// and the caller can accept another page.
pub fn should_load_more(
    scroll_top: f64,
    viewport_height: f64,
    document_height: f64,
    threshold: f64,
    has_more: bool,
    loading: bool,
) -> bool {
    has_more && !loading && scroll_top + viewport_height >= document_height - threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("card-{i}")).collect()
    }

    fn measured(heights: &[f64]) -> Vec<(String, f64)> {
        ids(heights.len()).into_iter().zip(heights.iter().copied()).collect()
    }

    #[test]
    fn column_count_for_common_widths() {
        assert_eq!(column_count(900.0, 280.0, 16.0, 4), 3);
        assert_eq!(column_count(5000.0, 280.0, 16.0, 4), 4);
        assert_eq!(column_count(200.0, 280.0, 16.0, 4), 1);
        assert_eq!(column_count(0.0, 280.0, 16.0, 4), 1);
        assert_eq!(column_count(f64::NAN, 280.0, 16.0, 4), 1);
    }

    #[test]
    fn column_width_subtracts_gutters() {
        let w = column_width(900.0, 3, 16.0);
        assert!((w - (900.0 - 32.0) / 3.0).abs() < 1e-9);
        assert_eq!(column_width(0.0, 3, 16.0), 0.0);
    }

    #[test]
    fn greedy_placement_picks_shortest_column_every_time() {
        let items = measured(&[100.0, 50.0, 80.0, 30.0, 60.0]);
        let placement = place(
            items.iter().map(|(id, h)| (id.as_str(), *h)),
            3,
            100.0,
            10.0,
        );

        assert_eq!(placement.column_heights, vec![110.0, 100.0, 160.0]);

        let col = |i: usize| placement.positions[&format!("card-{i}")];
        assert_eq!(col(0), Position { x: 0.0, y: 0.0, column: 0 });
        assert_eq!(col(1), Position { x: 110.0, y: 0.0, column: 1 });
        assert_eq!(col(2), Position { x: 220.0, y: 0.0, column: 2 });
        assert_eq!(col(3), Position { x: 110.0, y: 60.0, column: 1 });
        assert_eq!(col(4), Position { x: 220.0, y: 90.0, column: 2 });
    }

    #[test]
    fn ties_go_to_lowest_column() {
        let placement = place([("a", 10.0), ("b", 10.0), ("c", 10.0)], 2, 50.0, 0.0);
        assert_eq!(placement.positions["a"].column, 0);
        assert_eq!(placement.positions["b"].column, 1);
        assert_eq!(placement.positions["c"].column, 0);
    }

    #[test]
    fn placement_is_deterministic() {
        let items = measured(&[120.0, 340.0, 90.0, 200.0, 200.0, 75.0, 310.0]);
        let run = || place(items.iter().map(|(id, h)| (id.as_str(), *h)), 3, 280.0, 16.0);
        assert_eq!(run(), run());
    }

    #[test]
    fn non_finite_heights_do_not_poison_columns() {
        let placement = place([("a", f64::NAN), ("b", f64::INFINITY), ("c", 40.0)], 1, 100.0, 10.0);
        assert_eq!(placement.positions["b"].y, 10.0);
        assert_eq!(placement.positions["c"].y, 20.0);
        assert_eq!(placement.column_heights, vec![70.0]);
    }

    #[test]
    fn layout_is_not_ready_until_every_item_is_measured() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(3));

        let pass = layout.schedule();
        let outcome = layout.apply(pass, measured(&[100.0, 200.0]));
        assert_eq!(outcome, PassOutcome::Pending { unmeasured: 1 });
        assert!(!layout.is_ready());
        // provisional positions exist so the cards can render and be measured
        assert!(layout.position("card-2").is_some());

        let pass = layout.schedule();
        let outcome = layout.apply(pass, vec![("card-2".to_string(), 150.0)]);
        assert_eq!(outcome, PassOutcome::Ready);
        assert!(layout.is_ready());
        assert_eq!(layout.columns(), 3);
    }

    #[test]
    fn zero_height_measurement_keeps_item_unmeasured() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(1));

        let pass = layout.schedule();
        let outcome = layout.apply(pass, measured(&[0.0]));
        assert_eq!(outcome, PassOutcome::Pending { unmeasured: 1 });
    }

    #[test]
    fn superseded_pass_is_discarded() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(1));

        let old = layout.schedule();
        let new = layout.schedule();
        assert_eq!(layout.apply(old, measured(&[100.0])), PassOutcome::Stale);
        assert!(!layout.is_ready());
        assert_eq!(layout.apply(new, measured(&[100.0])), PassOutcome::Ready);
    }

    #[test]
    fn resize_invalidates_pending_passes() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(1));
        let pass = layout.schedule();

        layout.resize(1300.0);
        assert_eq!(layout.apply(pass, measured(&[100.0])), PassOutcome::Stale);
    }

    #[test]
    fn column_change_resets_positions() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(2));
        let pass = layout.schedule();
        layout.apply(pass, measured(&[100.0, 100.0]));
        assert!(layout.is_ready());

        assert!(layout.resize(400.0));
        assert!(!layout.is_ready());
        assert!(layout.position("card-0").is_none());
        assert_eq!(layout.columns(), 1);

        // same column count, different width
        assert!(!layout.resize(420.0));
    }

    #[test]
    fn zero_width_skips_layout() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.set_items(ids(1));
        let pass = layout.schedule();
        assert_eq!(layout.apply(pass, measured(&[100.0])), PassOutcome::NoWidth);
        assert!(!layout.is_ready());
    }

    #[test]
    fn removed_items_are_forgotten() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(3));
        let pass = layout.schedule();
        layout.apply(pass, measured(&[100.0, 100.0, 100.0]));

        layout.set_items(vec!["card-1".to_string()]);
        let pass = layout.schedule();
        assert_eq!(layout.apply(pass, Vec::new()), PassOutcome::Ready);
        assert!(layout.position("card-0").is_none());
        assert_eq!(layout.position("card-1").map(|p| p.column), Some(0));
    }

    #[test]
    fn container_height_drops_trailing_gap() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(4));
        let pass = layout.schedule();
        layout.apply(pass, measured(&[100.0, 50.0, 80.0, 30.0]));
        // columns: [100+16, 50+16+30+16, 80+16]
        assert_eq!(layout.column_heights(), &[116.0, 112.0, 96.0]);
        assert_eq!(layout.container_height(), 100.0);
    }

    #[test]
    fn appended_item_is_unmeasured_until_its_pass_lands() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(2));
        let pass = layout.schedule();
        assert_eq!(layout.apply(pass, measured(&[100.0, 120.0])), PassOutcome::Ready);

        layout.set_items(ids(3));
        assert!(!layout.is_ready());
        assert!(layout.is_measured("card-1"));
        assert!(!layout.is_measured("card-2"));

        // provisional placement does not make the new card visible
        let pass = layout.schedule();
        assert_eq!(layout.apply(pass, Vec::new()), PassOutcome::Pending { unmeasured: 1 });
        assert!(layout.is_settled("card-0"));
        assert!(layout.is_settled("card-1"));
        assert!(!layout.is_settled("card-2"));

        let pass = layout.schedule();
        assert_eq!(layout.apply(pass, vec![("card-2".to_string(), 90.0)]), PassOutcome::Ready);
        assert!(layout.is_settled("card-2"));
    }

    #[test]
    fn unmeasured_item_hides_everything_placed_after_it() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(3));
        let pass = layout.schedule();
        layout.apply(pass, vec![("card-0".to_string(), 100.0), ("card-2".to_string(), 100.0)]);

        assert!(layout.is_settled("card-0"));
        assert!(!layout.is_settled("card-1"));
        assert!(!layout.is_settled("card-2"));
        assert!(!layout.is_settled("missing"));
    }

    #[test]
    fn fallback_commit_makes_layout_ready() {
        let mut layout = MasonryLayout::new(MasonryConfig::default());
        layout.resize(900.0);
        layout.set_items(ids(2));
        let pass = layout.schedule();
        layout.apply(pass, measured(&[100.0, 0.0]));
        assert!(!layout.is_ready());

        let stale = layout.generation();
        layout.schedule();
        assert_eq!(layout.commit_fallback(stale), PassOutcome::Stale);

        let pass = layout.generation();
        assert_eq!(layout.commit_fallback(pass), PassOutcome::Ready);
        assert!(layout.is_settled("card-1"));
        assert_eq!(layout.column_heights(), &[116.0, 416.0, 0.0]);

        // a real height arriving later replaces the fallback
        let pass = layout.schedule();
        layout.apply(pass, vec![("card-1".to_string(), 50.0)]);
        assert_eq!(layout.column_heights(), &[116.0, 66.0, 0.0]);
    }

    #[test]
    fn load_more_near_bottom_only() {
        assert!(should_load_more(2000.0, 800.0, 3500.0, 1000.0, true, false));
        assert!(!should_load_more(1000.0, 800.0, 3500.0, 1000.0, true, false));
        assert!(!should_load_more(2000.0, 800.0, 3500.0, 1000.0, false, false));
        assert!(!should_load_more(2000.0, 800.0, 3500.0, 1000.0, true, true));
    }
}
