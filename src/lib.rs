// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

pub mod chat;
pub mod config;
pub mod form;
pub mod relay;
pub mod render;
pub mod store;
pub mod stream;
pub mod transcript;
pub mod typewriter;
pub mod upstream;
