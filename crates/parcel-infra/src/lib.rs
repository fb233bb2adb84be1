// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Parcel Infra
//!
//! Concrete HTTP collaborators for the resolver: the content server's entity
//! query and the empty tile catalog.

#![warn(missing_docs)]

mod catalog;
mod content;
mod http;

pub use catalog::HttpCatalogSource;
pub use content::CatalystContentClient;
pub use http::default_client;
