//! Autotest: directory-driven cases for template rendering through a web framework
//!
//! Every subdirectory of an autotest root is one case. A case may carry a
//! descriptor (`case.yaml`, or a [`CaseDescriptor`] registered in code), a
//! template (`template.hbs`) and stored fixtures (`expected.<ext>`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TestRunner                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  scan_dir(root) -> CaseSet                                  │
//! │  for each case, one at a time:                              │
//! │    ├── error path:  create_app must fail -> check_error     │
//! │    └── normal path: create_app -> load template             │
//! │          -> GET /test on an ephemeral port                  │
//! │          -> check_response | compare(body, ".html")         │
//! │          -> close server (every exit path)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ModuleCache + Purger     framework module isolation        │
//! │  Document + widgets       synthetic DOM event bubbling      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod descriptor;
pub mod dom;
pub mod error;
pub mod helpers;
pub mod runner;
pub mod scan;
pub mod widgets;

pub use descriptor::{CaseDescriptor, DefaultDescriptor, ResponseCheck, YamlDescriptor};
pub use dom::{trigger_click, trigger_mouse_event, Document, Event, EventPhase, MouseEventInit, NodeId};
pub use error::{AutotestError, AutotestResult};
pub use helpers::Helpers;
pub use runner::{RunnerConfig, TestRunner, DEFAULT_FIXTURE_EXT, TEST_PATH};
pub use scan::{cases_from_listing, scan_dir, CaseSet, ListingEntry, DESCRIPTOR_FILE, TEMPLATE_FILE};
pub use widgets::{DomHelpers, Widget, WidgetInstances, WidgetRegistry};
