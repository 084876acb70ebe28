use super::{Measure, MeasureResult};
use std::fmt;
use std::sync::Arc;

/// Projects an item onto the integer a measure aggregates.
pub type Selector<T> = Arc<dyn Fn(&T) -> i64>;

/// Number of items. Always present in every configuration.
#[derive(Debug, Clone, Default)]
pub struct CountMeasure {
    count: i64,
}

impl CountMeasure {
    pub const NAME: &'static str = "Count";

    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Measure<T> for CountMeasure {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn result(&self) -> MeasureResult {
        MeasureResult::Value(self.count)
    }

    fn add(&mut self, _item: &T) -> bool {
        self.count += 1;
        true
    }

    fn subtract(&mut self, _item: &T) -> bool {
        self.count -= 1;
        true
    }

    fn add_result(&mut self, other: MeasureResult) -> bool {
        self.count += other.value().unwrap_or(0);
        true
    }

    fn subtract_result(&mut self, other: MeasureResult) -> bool {
        self.count -= other.value().unwrap_or(0);
        true
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn create_new(&self) -> Box<dyn Measure<T>> {
        Box::new(CountMeasure::new())
    }

    fn clone_measure(&self) -> Box<dyn Measure<T>> {
        Box::new(self.clone())
    }
}

/// Sum of a projected integer. Wraps on overflow so add and subtract stay exact inverses.
pub struct SumMeasure<T> {
    name: Arc<str>,
    selector: Selector<T>,
    sum: i64,
}

impl<T> SumMeasure<T> {
    pub fn new(name: &str, selector: impl Fn(&T) -> i64 + 'static) -> Self {
        Self {
            name: Arc::from(name),
            selector: Arc::new(selector),
            sum: 0,
        }
    }
}

impl<T> Clone for SumMeasure<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            selector: Arc::clone(&self.selector),
            sum: self.sum,
        }
    }
}

impl<T> fmt::Debug for SumMeasure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumMeasure")
            .field("name", &self.name)
            .field("sum", &self.sum)
            .finish()
    }
}

impl<T: 'static> Measure<T> for SumMeasure<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn result(&self) -> MeasureResult {
        MeasureResult::Value(self.sum)
    }

    fn add(&mut self, item: &T) -> bool {
        self.sum = self.sum.wrapping_add((self.selector)(item));
        true
    }

    fn subtract(&mut self, item: &T) -> bool {
        self.sum = self.sum.wrapping_sub((self.selector)(item));
        true
    }

    fn add_result(&mut self, other: MeasureResult) -> bool {
        self.sum = self.sum.wrapping_add(other.value().unwrap_or(0));
        true
    }

    fn subtract_result(&mut self, other: MeasureResult) -> bool {
        self.sum = self.sum.wrapping_sub(other.value().unwrap_or(0));
        true
    }

    fn reset(&mut self) {
        self.sum = 0;
    }

    fn create_new(&self) -> Box<dyn Measure<T>> {
        Box::new(Self {
            sum: 0,
            ..self.clone()
        })
    }

    fn clone_measure(&self) -> Box<dyn Measure<T>> {
        Box::new(self.clone())
    }
}

// Shared state of the min/max measures. `lowest` selects which extreme is kept.
struct Extreme<T> {
    name: Arc<str>,
    selector: Selector<T>,
    current: Option<i64>,
    lowest: bool,
}

impl<T> Extreme<T> {
    fn new(name: &str, selector: Selector<T>, lowest: bool) -> Self {
        Self {
            name: Arc::from(name),
            selector,
            current: None,
            lowest,
        }
    }

    fn beats(&self, candidate: i64, current: i64) -> bool {
        if self.lowest {
            candidate < current
        } else {
            candidate > current
        }
    }

    fn include(&mut self, value: i64) -> bool {
        match self.current {
            Some(current) if !self.beats(value, current) => {}
            _ => self.current = Some(value),
        }
        true
    }

    // Only values strictly inside the current extreme can leave without a rescan.
    fn exclude(&self, value: i64) -> bool {
        match self.current {
            Some(current) => value != current && !self.beats(value, current),
            None => false,
        }
    }

    fn result(&self) -> MeasureResult {
        self.current.map_or(MeasureResult::Empty, MeasureResult::Value)
    }

    fn fresh(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            selector: Arc::clone(&self.selector),
            current: None,
            lowest: self.lowest,
        }
    }

    fn copy(&self) -> Self {
        Self {
            current: self.current,
            ..self.fresh()
        }
    }
}

/// Smallest projected value. Removing the current minimum forces a recompute.
pub struct MinMeasure<T>(Extreme<T>);

/// Largest projected value. Removing the current maximum forces a recompute.
pub struct MaxMeasure<T>(Extreme<T>);

impl<T> MinMeasure<T> {
    pub fn new(name: &str, selector: impl Fn(&T) -> i64 + 'static) -> Self {
        Self(Extreme::new(name, Arc::new(selector), true))
    }
}

impl<T> MaxMeasure<T> {
    pub fn new(name: &str, selector: impl Fn(&T) -> i64 + 'static) -> Self {
        Self(Extreme::new(name, Arc::new(selector), false))
    }
}

macro_rules! extreme_measure {
    ($measure:ident) => {
        impl<T> fmt::Debug for $measure<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($measure))
                    .field("name", &self.0.name)
                    .field("current", &self.0.current)
                    .finish()
            }
        }

        impl<T: 'static> Measure<T> for $measure<T> {
            fn name(&self) -> &str {
                &self.0.name
            }

            fn result(&self) -> MeasureResult {
                self.0.result()
            }

            fn add(&mut self, item: &T) -> bool {
                let value = (self.0.selector)(item);
                self.0.include(value)
            }

            fn subtract(&mut self, item: &T) -> bool {
                let value = (self.0.selector)(item);
                self.0.exclude(value)
            }

            fn add_result(&mut self, other: MeasureResult) -> bool {
                match other {
                    MeasureResult::Empty => true,
                    MeasureResult::Value(value) => self.0.include(value),
                }
            }

            fn subtract_result(&mut self, other: MeasureResult) -> bool {
                match other {
                    MeasureResult::Empty => true,
                    MeasureResult::Value(value) => self.0.exclude(value),
                }
            }

            fn reset(&mut self) {
                self.0.current = None;
            }

            fn create_new(&self) -> Box<dyn Measure<T>> {
                Box::new($measure(self.0.fresh()))
            }

            fn clone_measure(&self) -> Box<dyn Measure<T>> {
                Box::new($measure(self.0.copy()))
            }
        }
    };
}

extreme_measure!(MinMeasure);
extreme_measure!(MaxMeasure);
