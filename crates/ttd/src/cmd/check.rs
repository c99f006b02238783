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

//! Check command - validate a recording without replaying it

use std::path::Path;

use eyre::Result;
use tracing::info;
use ttd_client::Recording;

/// Load and validate the recording at `path`, then print a summary
pub fn check_recording(path: &Path) -> Result<()> {
    let recording = Recording::load(path)?;
    let (Some(first), Some(last)) = (recording.first_point(), recording.last_point()) else {
        eyre::bail!("Recording has no steps");
    };
    info!("Validated recording {}", path.display());

    println!(
        "Recording OK: {} steps, {} sources, points {first}..{last}",
        recording.steps.len(),
        recording.sources.len()
    );
    Ok(())
}
