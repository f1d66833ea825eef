//! K-way merge of source windows.
//!
//! Every window is already sorted by [`OrderKey`]. The merge walks per-window cursors,
//! so calling [`merge_forward`] or [`merge_backward`] again restarts from scratch. Lines
//! a window has marked unneeded are skipped.
//!
//! Zero windows yield nothing and a single window is walked directly without a heap.

use super::display_line::DisplayLine;
use super::source_window::SourceWindow;
use crate::model::OrderKey;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One line produced by the merge.
#[derive(Debug, Clone, Copy)]
pub struct MergedLine<'a> {
    /// Index of the window in the merged slice.
    pub window_index: usize,
    /// Index of the line inside its window.
    pub line_index: usize,
    /// The line itself.
    pub line: &'a DisplayLine,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Cursor {
    key: OrderKey,
    window_index: usize,
    line_index: usize,
}

#[derive(Debug)]
enum MergeState {
    Empty,
    Single {
        window_index: usize,
        next: usize,
        end: usize,
    },
    Forward(BinaryHeap<Reverse<Cursor>>),
    Backward(BinaryHeap<Cursor>),
}

/// Lazy merged sequence over a set of windows.
#[derive(Debug)]
pub struct MergeIter<'a> {
    windows: &'a [SourceWindow],
    state: MergeState,
}

/// Merge windows in ascending order.
pub fn merge_forward(windows: &[SourceWindow]) -> MergeIter<'_> {
    let state = match non_empty_windows(windows) {
        NonEmpty::None => MergeState::Empty,
        NonEmpty::One(w) => MergeState::Single {
            window_index: w,
            next: windows[w].unneeded_top(),
            end: windows[w].len(),
        },
        NonEmpty::Many => MergeState::Forward(
            windows
                .iter()
                .enumerate()
                .filter_map(|(w, window)| {
                    let first = window.unneeded_top();
                    window.lines().get(first).map(|line| {
                        Reverse(Cursor {
                            key: line.order_key(),
                            window_index: w,
                            line_index: first,
                        })
                    })
                })
                .collect(),
        ),
    };
    MergeIter { windows, state }
}

/// Merge windows in descending order.
pub fn merge_backward(windows: &[SourceWindow]) -> MergeIter<'_> {
    let state = match non_empty_windows(windows) {
        NonEmpty::None => MergeState::Empty,
        NonEmpty::One(w) => MergeState::Single {
            window_index: w,
            next: windows[w].len(),
            end: windows[w].unneeded_top(),
        },
        NonEmpty::Many => MergeState::Backward(
            windows
                .iter()
                .enumerate()
                .filter(|(_, window)| window.len() > window.unneeded_top())
                .map(|(w, window)| {
                    let last = window.len() - 1;
                    Cursor {
                        key: window.lines()[last].order_key(),
                        window_index: w,
                        line_index: last,
                    }
                })
                .collect(),
        ),
    };
    MergeIter { windows, state }
}

enum NonEmpty {
    None,
    One(usize),
    Many,
}

fn non_empty_windows(windows: &[SourceWindow]) -> NonEmpty {
    let mut found = NonEmpty::None;
    for (i, window) in windows.iter().enumerate() {
        if window.needed_lines().is_empty() {
            continue;
        }
        found = match found {
            NonEmpty::None => NonEmpty::One(i),
            _ => return NonEmpty::Many,
        };
    }
    found
}

fn produce(windows: &[SourceWindow], window_index: usize, line_index: usize) -> MergedLine<'_> {
    MergedLine {
        window_index,
        line_index,
        line: &windows[window_index].lines()[line_index],
    }
}

impl<'a> Iterator for MergeIter<'a> {
    type Item = MergedLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let windows = self.windows;
        match &mut self.state {
            MergeState::Empty => None,
            MergeState::Single {
                window_index,
                next,
                end,
            } => {
                let w = *window_index;
                if *next < *end {
                    // forward
                    let i = *next;
                    *next += 1;
                    Some(produce(windows, w, i))
                } else if *next > *end {
                    // backward
                    *next -= 1;
                    let i = *next;
                    Some(produce(windows, w, i))
                } else {
                    None
                }
            }
            MergeState::Forward(heap) => {
                let Reverse(cursor) = heap.pop()?;
                let window = &windows[cursor.window_index];
                if let Some(line) = window.lines().get(cursor.line_index + 1) {
                    heap.push(Reverse(Cursor {
                        key: line.order_key(),
                        window_index: cursor.window_index,
                        line_index: cursor.line_index + 1,
                    }));
                }
                Some(produce(windows, cursor.window_index, cursor.line_index))
            }
            MergeState::Backward(heap) => {
                let cursor = heap.pop()?;
                let window = &windows[cursor.window_index];
                if cursor.line_index > window.unneeded_top() {
                    let prev = cursor.line_index - 1;
                    heap.push(Cursor {
                        key: window.lines()[prev].order_key(),
                        window_index: cursor.window_index,
                        line_index: prev,
                    });
                }
                Some(produce(windows, cursor.window_index, cursor.line_index))
            }
        }
    }
}
