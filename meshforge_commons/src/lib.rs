// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Small numeric helpers: ordered floats for use as map/queue keys, lerp.
pub mod math;

/// Iterator and slice extension traits shared by the mesh and trace crates.
pub mod utils;
