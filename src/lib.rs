// SPDX-License-Identifier: MIT

pub mod flowgate;
