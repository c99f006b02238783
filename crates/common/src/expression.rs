// TTD - Time-Travel Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

/// Normalize an expression by replacing any contiguous whitespace with a single space
pub fn normalize_expression(expr: &str) -> String {
    expr.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A piece of a logpoint message template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart<'a> {
    /// Text copied verbatim into the message
    Text(&'a str),
    /// An expression to evaluate and splice into the message
    Expr(&'a str),
}

/// Split a message template into literal text and `{expr}` placeholders.
///
/// `{{` and `}}` are not special; an unterminated `{` is kept as text.
pub fn split_template(template: &str) -> Vec<TemplatePart<'_>> {
    let mut parts = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        if open > 0 {
            parts.push(TemplatePart::Text(&rest[..open]));
        }
        let expr = rest[open + 1..close].trim();
        if !expr.is_empty() {
            parts.push(TemplatePart::Expr(expr));
        }
        rest = &rest[close + 1..];
    }

    if !rest.is_empty() {
        parts.push(TemplatePart::Text(rest));
    }
    parts
}
