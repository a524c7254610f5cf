// crates/camstate-daemon/src/modules.rs
// ============================================================================
// Module: State Modules
// Description: Entry definitions owned by each functional area.
// Purpose: Declare names, defaults, capabilities, and validators in one place.
// Dependencies: camstate-core
// ============================================================================

//! ## Overview
//! Each [`StateModule`] owns a fixed set of entries and registers them once at
//! startup. Modules whose defaults depend on the device are built from the
//! probed [`HardwareCapabilities`], so probing happens before they register.

// ============================================================================
// SECTION: Imports
// ============================================================================

use camstate_core::CATEGORIES_KEY;
use camstate_core::CATEGORY_COUNTER_KEY;
use camstate_core::Capability;
use camstate_core::CapabilitySet;
use camstate_core::Category;
use camstate_core::CategoryId;
use camstate_core::ObservableRegistry;
use camstate_core::RegistryError;
use camstate_core::StateSpec;
use camstate_core::StateValue;
use camstate_core::Timestamp;
use camstate_core::encode_categories;
use camstate_core::validate_categories;

use crate::hardware::HardwareCapabilities;

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Device display name.
pub const DEVICE_NAME_KEY: &str = "deviceName";
/// Client UI theme.
pub const THEME_KEY: &str = "theme";
/// IANA timezone name.
pub const TIMEZONE_KEY: &str = "timezone";
/// Probed hardware capabilities.
pub const HARDWARE_CAPABILITIES_KEY: &str = "hardwareCapabilities";
/// Infrared illuminator switch.
pub const IR_LED_KEY: &str = "irLed";
/// Infrared cut filter switch.
pub const IR_CUT_KEY: &str = "irCut";
/// Capture resolution.
pub const RESOLUTION_KEY: &str = "resolution";
/// Capture frame rate.
pub const FPS_KEY: &str = "fps";
/// Recording switch.
pub const RECORDING_ENABLED_KEY: &str = "recordingEnabled";

/// Accepted theme names.
const THEMES: [&str; 2] = ["light", "dark"];
/// Longest accepted device name.
const MAX_DEVICE_NAME_CHARS: usize = 64;

/// Every capability that may read shared entries.
const EVERYONE: CapabilitySet = CapabilitySet::ALL;
/// Device configuration writers.
const ADMINS: CapabilitySet = CapabilitySet::of(&[Capability::Admin, Capability::System]);
/// Camera control writers.
const OPERATORS: CapabilitySet = CapabilitySet::of(&[Capability::Operator, Capability::Admin, Capability::System]);

// ============================================================================
// SECTION: Module Trait
// ============================================================================

/// Group of entries registered together.
pub trait StateModule {
    /// Module label for logs.
    fn name(&self) -> &'static str;

    /// Entry specifications, in registration order.
    fn specs(&self) -> Vec<StateSpec>;

    /// Entries whose changes drive hardware.
    fn actuated_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Registers every entry. Returns the registered names.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when any entry is rejected.
    fn register(&self, registry: &ObservableRegistry) -> Result<Vec<String>, RegistryError> {
        let mut names = Vec::new();
        for spec in self.specs() {
            let entry = registry.register(spec)?;
            names.push(entry.name().to_string());
        }
        Ok(names)
    }
}

// ============================================================================
// SECTION: System
// ============================================================================

/// Device identity and presentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemModule;

impl StateModule for SystemModule {
    fn name(&self) -> &'static str {
        "system"
    }

    fn specs(&self) -> Vec<StateSpec> {
        vec![
            StateSpec::new(DEVICE_NAME_KEY, "camstate")
                .readable_by(EVERYONE)
                .writable_by(ADMINS)
                .persistent()
                .validator(|value| match value.as_text() {
                    Some(text) if !text.trim().is_empty() && text.chars().count() <= MAX_DEVICE_NAME_CHARS => Ok(()),
                    Some(_) => Err(format!("device name must be 1 to {MAX_DEVICE_NAME_CHARS} characters")),
                    None => Err("device name must be text".to_string()),
                }),
            StateSpec::new(THEME_KEY, "light")
                .readable_by(EVERYONE)
                .writable_by(Capability::Viewer | Capability::Operator | ADMINS)
                .persistent()
                .validator(|value| match value.as_text() {
                    Some(theme) if THEMES.contains(&theme) => Ok(()),
                    _ => Err(format!("theme must be one of {}", THEMES.join(", "))),
                }),
            StateSpec::new(TIMEZONE_KEY, "UTC")
                .readable_by(EVERYONE)
                .writable_by(ADMINS)
                .persistent()
                .validator(|value| match value.as_text() {
                    Some(zone) if !zone.trim().is_empty() && !zone.contains(char::is_whitespace) => Ok(()),
                    _ => Err("timezone must be a non-empty name without spaces".to_string()),
                }),
        ]
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Tag categories and the id allocator.
///
/// Both entries are kept across factory resets and mirrored into the
/// metadata store by the sync bridge.
#[derive(Debug, Clone)]
pub struct CatalogModule {
    /// Categories present on first boot.
    defaults: Vec<Category>,
}

impl CatalogModule {
    /// Creates the module with first-boot categories.
    #[must_use]
    pub const fn new(defaults: Vec<Category>) -> Self {
        Self {
            defaults,
        }
    }

    /// First-boot categories.
    #[must_use]
    pub fn default_categories() -> Vec<Category> {
        [(1, "Event", "#3B82F6"), (2, "Note", "#10B981")]
            .into_iter()
            .map(|(id, name, color)| Category {
                id: CategoryId::new(id),
                name: name.to_string(),
                color: color.to_string(),
                created_at: Timestamp::from_millis(0),
            })
            .collect()
    }

    /// Next free id after the defaults.
    fn first_free_id(&self) -> i64 {
        self.defaults.iter().map(|category| category.id.get()).max().map_or(1, |max| max.saturating_add(1))
    }
}

impl Default for CatalogModule {
    fn default() -> Self {
        Self::new(Self::default_categories())
    }
}

impl StateModule for CatalogModule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn specs(&self) -> Vec<StateSpec> {
        vec![
            StateSpec::new(CATEGORIES_KEY, encode_categories(&self.defaults))
                .readable_by(EVERYONE)
                .writable_by(OPERATORS)
                .persistent()
                .validator(validate_categories),
            StateSpec::new(CATEGORY_COUNTER_KEY, StateValue::Int(self.first_free_id()))
                .readable_by(EVERYONE)
                .writable_by(Capability::System)
                .persistent()
                .validator(|value| match value.as_int() {
                    Some(next) if next >= 1 => Ok(()),
                    _ => Err("category counter must be a positive integer".to_string()),
                }),
        ]
    }
}

// ============================================================================
// SECTION: Hardware
// ============================================================================

/// Detected capabilities and infrared controls.
#[derive(Debug, Clone)]
pub struct HardwareModule {
    /// Probed capabilities.
    capabilities: HardwareCapabilities,
}

impl HardwareModule {
    /// Creates the module from probed capabilities.
    #[must_use]
    pub const fn new(capabilities: HardwareCapabilities) -> Self {
        Self {
            capabilities,
        }
    }
}

impl StateModule for HardwareModule {
    fn name(&self) -> &'static str {
        "hardware"
    }

    fn specs(&self) -> Vec<StateSpec> {
        let ir_led = self.capabilities.ir_led;
        let ir_cut = self.capabilities.ir_cut;
        let writers = OPERATORS.with(Capability::Hardware);
        vec![
            StateSpec::new(HARDWARE_CAPABILITIES_KEY, self.capabilities.to_value())
                .readable_by(EVERYONE)
                .writable_by(Capability::Hardware | Capability::System),
            StateSpec::new(IR_LED_KEY, false).readable_by(EVERYONE).writable_by(writers).validator(move |value| {
                match value.as_bool() {
                    Some(false) => Ok(()),
                    Some(true) if ir_led => Ok(()),
                    Some(true) => Err("device has no infrared illuminator".to_string()),
                    None => Err("irLed must be a boolean".to_string()),
                }
            }),
            StateSpec::new(IR_CUT_KEY, ir_cut).readable_by(EVERYONE).writable_by(writers).validator(move |value| {
                match value.as_bool() {
                    Some(enabled) if ir_cut || enabled == ir_cut => Ok(()),
                    Some(_) => Err("device has no switchable infrared cut filter".to_string()),
                    None => Err("irCut must be a boolean".to_string()),
                }
            }),
        ]
    }

    fn actuated_keys(&self) -> &'static [&'static str] {
        &[IR_LED_KEY, IR_CUT_KEY]
    }
}

// ============================================================================
// SECTION: Camera
// ============================================================================

/// Capture settings bounded by the detected capabilities.
#[derive(Debug, Clone)]
pub struct CameraModule {
    /// Probed capabilities.
    capabilities: HardwareCapabilities,
}

impl CameraModule {
    /// Default frame rate when the device allows it.
    pub const PREFERRED_FPS: i64 = 30;

    /// Creates the module from probed capabilities.
    #[must_use]
    pub const fn new(capabilities: HardwareCapabilities) -> Self {
        Self {
            capabilities,
        }
    }
}

impl StateModule for CameraModule {
    fn name(&self) -> &'static str {
        "camera"
    }

    fn specs(&self) -> Vec<StateSpec> {
        let supported = self.capabilities.clone();
        let max_fps = self.capabilities.max_fps;
        vec![
            StateSpec::new(RESOLUTION_KEY, self.capabilities.default_resolution())
                .readable_by(EVERYONE)
                .writable_by(OPERATORS)
                .persistent()
                .validator(move |value| match value.as_text() {
                    Some(resolution) if supported.supports_resolution(resolution) => Ok(()),
                    Some(resolution) => Err(format!("unsupported resolution {resolution}")),
                    None => Err("resolution must be text".to_string()),
                }),
            StateSpec::new(FPS_KEY, Self::PREFERRED_FPS.min(max_fps))
                .readable_by(EVERYONE)
                .writable_by(OPERATORS)
                .persistent()
                .validator(move |value| match value.as_int() {
                    Some(fps) if (1..=max_fps).contains(&fps) => Ok(()),
                    _ => Err(format!("fps must be an integer between 1 and {max_fps}")),
                }),
            StateSpec::new(RECORDING_ENABLED_KEY, false).readable_by(EVERYONE).writable_by(OPERATORS).validator(
                |value| match value.as_bool() {
                    Some(_) => Ok(()),
                    None => Err("recordingEnabled must be a boolean".to_string()),
                },
            ),
        ]
    }

    fn actuated_keys(&self) -> &'static [&'static str] {
        &[RESOLUTION_KEY, FPS_KEY, RECORDING_ENABLED_KEY]
    }
}
