//! Geometry tests, the shrinking field and spawn placement

use crate::ws::protocol::FieldState;

/// Circle-circle overlap, touching counts
pub fn circles_overlap(x1: f32, y1: f32, r1: f32, x2: f32, y2: f32, r2: f32) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let combined = r1 + r2;
    dx * dx + dy * dy <= combined * combined
}

/// Circle against a center-referenced rectangle via the clamped nearest point
pub fn circle_rect_overlap(
    cx: f32,
    cy: f32,
    radius: f32,
    rect_x: f32,
    rect_y: f32,
    rect_w: f32,
    rect_h: f32,
) -> bool {
    let left = rect_x - rect_w / 2.0;
    let top = rect_y - rect_h / 2.0;
    let nearest_x = cx.clamp(left, left + rect_w);
    let nearest_y = cy.clamp(top, top + rect_h);
    let dx = cx - nearest_x;
    let dy = cy - nearest_y;
    dx * dx + dy * dy < radius * radius
}

/// Square playable region that closes in over the match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayingField {
    pub x: f32,
    pub y: f32,
    pub side: f32,
    min_side: f32,
}

impl PlayingField {
    pub fn new(side: f32, min_side: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            side,
            min_side: min_side.min(side),
        }
    }

    /// Center strictly inside the field
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x > self.x && x < self.x + self.side && y > self.y && y < self.y + self.side
    }

    /// Shrink by `step` around the center, returns false once at the minimum
    pub fn shrink(&mut self, step: f32) -> bool {
        let target = (self.side - step).max(self.min_side);
        if target >= self.side {
            return false;
        }
        let inset = (self.side - target) / 2.0;
        self.x += inset;
        self.y += inset;
        self.side = target;
        true
    }

    pub fn state(&self) -> FieldState {
        FieldState {
            x: self.x,
            y: self.y,
            side: self.side,
        }
    }
}

/// Spread `count` spawn points clockwise around the square inset from the
/// board edge, starting at the top-left corner. Each step walks
/// `floor(perimeter / count)`; distance left over at a corner carries onto
/// the next side so no point overshoots a corner.
pub fn perimeter_positions(side: f32, inset: f32, count: usize) -> Vec<(f32, f32)> {
    if count == 0 {
        return Vec::new();
    }

    let span = (side - 2.0 * inset).max(0.0);
    let perimeter = 4.0 * span;
    let increment = (perimeter / count as f32).floor();

    let min = inset;
    let max = inset + span;
    let (mut x, mut y) = (min, min);
    let mut positions = Vec::with_capacity(count);

    for _ in 0..count {
        positions.push((x, y));

        let mut remaining = increment;
        // Four legs at most: a lone player's step is the whole square
        let mut legs = 0;
        while remaining > 0.0 && legs < 4 {
            if y == min && x < max {
                (x, remaining) = walk(x, max, remaining);
            } else if x == max && y < max {
                (y, remaining) = walk(y, max, remaining);
            } else if y == max && x > min {
                (x, remaining) = walk(x, min, remaining);
            } else if x == min && y > min {
                (y, remaining) = walk(y, min, remaining);
            } else {
                break;
            }
            legs += 1;
        }
    }

    positions
}

/// Move `from` toward `corner` by up to `budget`, snapping onto the corner
/// when the budget reaches it. Returns the new coordinate and the carry.
fn walk(from: f32, corner: f32, budget: f32) -> (f32, f32) {
    let distance = (corner - from).abs();
    if budget >= distance {
        (corner, budget - distance)
    } else if corner > from {
        (from + budget, 0.0)
    } else {
        (from - budget, 0.0)
    }
}
