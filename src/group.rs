//! Group boundary detection over a pre-sorted row stream.

use crate::models::{MeasureSource, Row, Value};

/// Values of the grouping columns from the outermost level down to one level.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    /// The value of the innermost level this key describes.
    pub fn last(&self) -> Option<&Value> {
        self.0.last()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

/// Named numeric buckets summed over one group's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningAggregate {
    names: Vec<String>,
    values: Vec<f64>,
    rows: usize,
}

impl RunningAggregate {
    pub fn new(names: &[String]) -> Self {
        Self {
            names: names.to_vec(),
            values: vec![0.0; names.len()],
            rows: 0,
        }
    }

    pub fn add(&mut self, row: &Row) {
        for (name, value) in self.names.iter().zip(self.values.iter_mut()) {
            *value += row.number(name);
        }
        self.rows += 1;
    }

    pub fn get(&self, name: &str) -> f64 {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
            .unwrap_or(0.0)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Sum of `stages` compared with `total`, within a small tolerance for
    /// fractional measures.
    pub fn is_balanced(&self, stages: &[String], total: &str) -> bool {
        let sum: f64 = stages.iter().map(|s| self.get(s)).sum();
        (sum - self.get(total)).abs() < 1e-6
    }
}

impl MeasureSource for RunningAggregate {
    fn number(&self, name: &str) -> f64 {
        self.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    Begin { level: usize, key: GroupKey },
    Row(Row),
    End {
        level: usize,
        key: GroupKey,
        aggregate: RunningAggregate,
    },
}

#[derive(Debug, Clone)]
struct OpenGroup {
    value: Value,
    aggregate: RunningAggregate,
}

#[derive(Debug, Clone)]
enum Position {
    NoGroup,
    InGroup(Vec<OpenGroup>),
}

/// Raises begin/end events whenever any grouping column changes value.
///
/// Levels are nested: a change at level `d` closes levels `d..` innermost
/// first and reopens them outermost first. Rows must arrive sorted by the
/// grouping columns; an unsorted stream simply produces more groups.
pub struct GroupTracker {
    columns: Vec<String>,
    measures: Vec<String>,
    position: Position,
}

impl GroupTracker {
    pub fn new(columns: Vec<String>, measures: Vec<String>) -> Self {
        Self {
            columns,
            measures,
            position: Position::NoGroup,
        }
    }

    pub fn levels(&self) -> usize {
        self.columns.len()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.position, Position::NoGroup)
    }

    /// Keys of every open level, outermost first.
    pub fn open_keys(&self) -> Vec<GroupKey> {
        match &self.position {
            Position::NoGroup => Vec::new(),
            Position::InGroup(open) => (1..=open.len())
                .map(|depth| GroupKey(open[..depth].iter().map(|g| g.value.clone()).collect()))
                .collect(),
        }
    }

    pub fn push(&mut self, row: Row) -> Vec<GroupEvent> {
        let values: Vec<Value> = self
            .columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect();

        let mut events = Vec::new();
        let position = std::mem::replace(&mut self.position, Position::NoGroup);
        let mut open = match position {
            Position::NoGroup => Vec::new(),
            Position::InGroup(open) => {
                let changed = open
                    .iter()
                    .zip(values.iter())
                    .position(|(g, v)| &g.value != v)
                    .unwrap_or(open.len());
                let mut open = open;
                close_from(&mut open, changed, &mut events);
                open
            }
        };

        for (level, value) in values.iter().enumerate().skip(open.len()) {
            open.push(OpenGroup {
                value: value.clone(),
                aggregate: RunningAggregate::new(&self.measures),
            });
            events.push(GroupEvent::Begin {
                level,
                key: GroupKey(values[..=level].to_vec()),
            });
        }

        for group in &mut open {
            group.aggregate.add(&row);
        }
        events.push(GroupEvent::Row(row));
        self.position = Position::InGroup(open);
        events
    }

    /// Close every open group and return to the idle state.
    pub fn finish(&mut self) -> Vec<GroupEvent> {
        let mut events = Vec::new();
        if let Position::InGroup(mut open) = std::mem::replace(&mut self.position, Position::NoGroup) {
            close_from(&mut open, 0, &mut events);
        }
        events
    }
}

/// Pop levels `from..` innermost first, emitting their end events.
fn close_from(open: &mut Vec<OpenGroup>, from: usize, events: &mut Vec<GroupEvent>) {
    while open.len() > from {
        let level = open.len() - 1;
        let key = GroupKey(open.iter().map(|g| g.value.clone()).collect());
        if let Some(group) = open.pop() {
            events.push(GroupEvent::End {
                level,
                key,
                aggregate: group.aggregate,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cust: &str, vnd: &str, ord: i64) -> Row {
        Row::new(vec![
            ("cust", Value::from(cust)),
            ("vnd", Value::from(vnd)),
            ("ord", Value::from(ord)),
        ])
    }

    fn run(tracker: &mut GroupTracker, rows: Vec<Row>) -> Vec<GroupEvent> {
        let mut events = Vec::new();
        for r in rows {
            events.extend(tracker.push(r));
        }
        events.extend(tracker.finish());
        events
    }

    fn label(key: &GroupKey) -> String {
        key.0.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("/")
    }

    fn summary(events: &[GroupEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                GroupEvent::Begin { level, key } => format!("B{level}:{}", label(key)),
                GroupEvent::Row(_) => "R".to_string(),
                GroupEvent::End { level, key, .. } => format!("E{level}:{}", label(key)),
            })
            .collect()
    }

    #[test]
    fn test_single_level_boundaries() {
        let mut t = GroupTracker::new(vec!["cust".into()], vec!["ord".into()]);
        let rows = vec![
            row("A", "-", 1),
            row("A", "-", 2),
            row("A", "-", 3),
            row("B", "-", 10),
            row("B", "-", 20),
            row("C", "-", 100),
        ];
        let events = run(&mut t, rows);
        assert_eq!(
            summary(&events),
            vec!["B0:A", "R", "R", "R", "E0:A", "B0:B", "R", "R", "E0:B", "B0:C", "R", "E0:C"]
        );
        let GroupEvent::End { aggregate, .. } = &events[4] else {
            panic!("expected end of A");
        };
        assert_eq!(aggregate.get("ord"), 6.0);
        assert_eq!(aggregate.rows(), 3);
        assert!(t.is_idle());
    }

    #[test]
    fn test_begin_and_end_counts_match() {
        let inputs: Vec<Vec<&str>> = vec![
            vec![],
            vec!["A"],
            vec!["A", "A"],
            vec!["A", "B", "A"],
            vec!["A", "B", "B", "C", "C", "C"],
        ];
        for keys in inputs {
            let mut t = GroupTracker::new(vec!["cust".into(), "vnd".into()], vec!["ord".into()]);
            let rows = keys.iter().map(|k| row(k, k, 1)).collect();
            let events = run(&mut t, rows);
            let begins = events.iter().filter(|e| matches!(e, GroupEvent::Begin { .. })).count();
            let ends = events.iter().filter(|e| matches!(e, GroupEvent::End { .. })).count();
            assert_eq!(begins, ends, "keys {keys:?}");
        }
    }

    #[test]
    fn test_stream_ending_mid_group_still_closes() {
        let mut t = GroupTracker::new(vec!["cust".into()], vec!["ord".into()]);
        let mut events = t.push(row("A", "-", 4));
        events.extend(t.push(row("A", "-", 5)));
        assert!(!events.iter().any(|e| matches!(e, GroupEvent::End { .. })));
        let tail = t.finish();
        assert_eq!(tail.len(), 1);
        let GroupEvent::End { aggregate, .. } = &tail[0] else {
            panic!("expected end");
        };
        assert_eq!(aggregate.get("ord"), 9.0);
        assert!(t.finish().is_empty());
    }

    #[test]
    fn test_outer_change_closes_inner_first() {
        let mut t = GroupTracker::new(vec!["cust".into(), "vnd".into()], vec!["ord".into()]);
        let rows = vec![
            row("C1", "V1", 10),
            row("C1", "V1", 10),
            row("C1", "V2", 4),
            row("C2", "V2", 1),
        ];
        let events = run(&mut t, rows);
        assert_eq!(
            summary(&events),
            vec![
                "B0:C1", "B1:C1/V1", "R", "R", "E1:C1/V1", "B1:C1/V2", "R", "E1:C1/V2",
                "E0:C1", "B0:C2", "B1:C2/V2", "R", "E1:C2/V2", "E0:C2",
            ]
        );
        // Same vendor under a new customer is a new inner group.
        let totals: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                GroupEvent::End { aggregate, .. } => Some(aggregate.get("ord")),
                _ => None,
            })
            .collect();
        assert_eq!(totals, vec![20.0, 4.0, 24.0, 1.0, 1.0]);
    }

    #[test]
    fn test_real_values_cannot_collide_with_no_group() {
        // Values that legacy code used as "no prior key" markers are ordinary keys here.
        let mut t = GroupTracker::new(vec!["cust".into()], vec!["ord".into()]);
        let events = run(&mut t, vec![row("-1", "-", 1), row("", "-", 1)]);
        assert_eq!(summary(&events), vec!["B0:-1", "R", "E0:-1", "B0:", "R", "E0:"]);
    }

    #[test]
    fn test_no_levels_passes_rows_through() {
        let mut t = GroupTracker::new(vec![], vec!["ord".into()]);
        let events = run(&mut t, vec![row("A", "-", 1), row("B", "-", 2)]);
        assert_eq!(summary(&events), vec!["R", "R"]);
    }

    #[test]
    fn test_open_keys() {
        let mut t = GroupTracker::new(vec!["cust".into(), "vnd".into()], vec![]);
        assert!(t.open_keys().is_empty());
        t.push(row("C1", "V1", 1));
        let keys = t.open_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].0, vec![Value::from("C1"), Value::from("V1")]);
    }

    #[test]
    fn test_balance_check() {
        let names: Vec<String> = ["lines", "req", "perfect"].iter().map(|s| s.to_string()).collect();
        let mut agg = RunningAggregate::new(&names);
        agg.add(&Row::new(vec![
            ("lines", Value::from(3i64)),
            ("req", Value::from(1i64)),
            ("perfect", Value::from(2i64)),
        ]));
        assert!(agg.is_balanced(&names[1..], "lines"));
        agg.add(&Row::new(vec![("lines", Value::from(1i64))]));
        assert!(!agg.is_balanced(&names[1..], "lines"));
    }
}
