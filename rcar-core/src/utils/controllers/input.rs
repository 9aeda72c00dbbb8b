//! Typed gamepad input.
//!
//! Decodes Linux joystick (`/dev/input/jsN`) event records and routes them to
//! a `ControlSurface` through a table keyed by input code. Which hardware
//! axis or button number carries which code is device specific; it comes in
//! through a `DeviceMap` rather than being queried from the device.
//!
//! Scripted input uses `ControlCommand`, serialized as JSON with tag `"cc"`.

use hashbrown::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::error::InputError;

/// Raw range of a joystick axis.
pub const AXIS_MIN: f64 = -32767.0;
pub const AXIS_MAX: f64 = 32767.0;

const JS_EVENT_BUTTON: u8 = 0x01;
const JS_EVENT_AXIS: u8 = 0x02;
const JS_EVENT_INIT: u8 = 0x80;

/// Size of one `struct js_event` record.
pub const JS_EVENT_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsEventKind {
    Button,
    Axis,
}

/// One decoded joystick event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsEvent {
    /// Timestamp in milliseconds.
    pub time: u32,
    pub value: i16,
    pub kind: JsEventKind,
    /// Synthetic event reporting the initial state on open.
    pub init: bool,
    /// Hardware axis or button number.
    pub number: u8,
}

impl JsEvent {
    /// Decode a little-endian `js_event` record.
    pub fn decode(buf: &[u8]) -> Result<Self, InputError> {
        if buf.len() < JS_EVENT_LEN {
            return Err(InputError::ShortRead(buf.len()));
        }
        let time = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let value = i16::from_le_bytes([buf[4], buf[5]]);
        let ty = buf[6];
        let kind = match ty & !JS_EVENT_INIT {
            JS_EVENT_BUTTON => JsEventKind::Button,
            JS_EVENT_AXIS => JsEventKind::Axis,
            _ => return Err(InputError::UnknownType(ty)),
        };
        Ok(Self {
            time,
            value,
            kind,
            init: ty & JS_EVENT_INIT != 0,
            number: buf[7],
        })
    }
}

/// Linux absolute-axis codes used by the car's gamepads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Axis {
    X = 0x00,
    Y = 0x01,
    Z = 0x02,
    Rx = 0x03,
    Ry = 0x04,
    Rz = 0x05,
    Throttle = 0x06,
    Rudder = 0x07,
    Wheel = 0x08,
    Gas = 0x09,
    Brake = 0x0a,
    Hat0X = 0x10,
    Hat0Y = 0x11,
}

impl Axis {
    pub fn from_code(code: u8) -> Option<Self> {
        use Axis::*;
        [X, Y, Z, Rx, Ry, Rz, Throttle, Rudder, Wheel, Gas, Brake, Hat0X, Hat0Y]
            .into_iter()
            .find(|a| *a as u8 == code)
    }
}

/// Linux gamepad button codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum Button {
    A = 0x130,
    B = 0x131,
    C = 0x132,
    X = 0x133,
    Y = 0x134,
    Z = 0x135,
    Tl = 0x136,
    Tr = 0x137,
    Tl2 = 0x138,
    Tr2 = 0x139,
    Select = 0x13a,
    Start = 0x13b,
    Mode = 0x13c,
    ThumbL = 0x13d,
    ThumbR = 0x13e,
}

impl Button {
    pub fn from_code(code: u16) -> Option<Self> {
        use Button::*;
        [A, B, C, X, Y, Z, Tl, Tr, Tl2, Tr2, Select, Start, Mode, ThumbL, ThumbR]
            .into_iter()
            .find(|b| *b as u16 == code)
    }
}

/// Hardware number to input code, as reported by the device driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceMap {
    pub axes: Vec<u8>,
    pub buttons: Vec<u16>,
}

impl Default for DeviceMap {
    /// Layout of an Xbox wireless pad on the Linux `xpadneo` driver.
    fn default() -> Self {
        Self {
            axes: [
                Axis::X,
                Axis::Y,
                Axis::Z,
                Axis::Rx,
                Axis::Ry,
                Axis::Rz,
                Axis::Gas,
                Axis::Brake,
                Axis::Hat0X,
                Axis::Hat0Y,
            ]
            .iter()
            .map(|a| *a as u8)
            .collect(),
            buttons: [
                Button::A,
                Button::B,
                Button::X,
                Button::Y,
                Button::Tl,
                Button::Tr,
                Button::Select,
                Button::Start,
                Button::Mode,
                Button::ThumbL,
                Button::ThumbR,
            ]
            .iter()
            .map(|b| *b as u16)
            .collect(),
        }
    }
}

impl DeviceMap {
    pub fn axis(
        &self,
        number: u8,
    ) -> Option<Axis> {
        self.axes.get(number as usize).copied().and_then(Axis::from_code)
    }

    pub fn button(
        &self,
        number: u8,
    ) -> Option<Button> {
        self.buttons
            .get(number as usize)
            .copied()
            .and_then(Button::from_code)
    }
}

/// Handlers an input source can drive.
///
/// Axis handlers receive the raw value together with the range it came from.
pub trait ControlSurface {
    fn on_steering(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    );

    fn on_forward(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    );

    fn on_reverse(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    );

    fn on_camera_rotate(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    );

    /// Hat pushed towards `min` switches the light on, towards `max` off.
    fn on_light(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    );

    fn on_brake(
        &mut self,
        pressed: bool,
    );

    fn on_connected(&mut self);

    fn on_disconnected(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisAction {
    Steering,
    Forward,
    Reverse,
    CameraPan,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Brake,
}

/// Which action each axis and button triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBindings {
    axes: HashMap<Axis, AxisAction>,
    buttons: HashMap<Button, ButtonAction>,
}

impl Default for InputBindings {
    fn default() -> Self {
        let mut bindings = Self::empty();
        bindings
            .bind_axis(Axis::X, AxisAction::Steering)
            .bind_axis(Axis::Gas, AxisAction::Forward)
            .bind_axis(Axis::Brake, AxisAction::Reverse)
            .bind_axis(Axis::Z, AxisAction::CameraPan)
            .bind_axis(Axis::Hat0Y, AxisAction::Light)
            .bind_button(Button::B, ButtonAction::Brake);
        bindings
    }
}

impl InputBindings {
    pub fn empty() -> Self {
        Self {
            axes: HashMap::new(),
            buttons: HashMap::new(),
        }
    }

    pub fn bind_axis(
        &mut self,
        axis: Axis,
        action: AxisAction,
    ) -> &mut Self {
        self.axes.insert(axis, action);
        self
    }

    pub fn bind_button(
        &mut self,
        button: Button,
        action: ButtonAction,
    ) -> &mut Self {
        self.buttons.insert(button, action);
        self
    }

    /// Route one event to `surface`. Returns false if nothing is bound to it.
    pub fn dispatch<S: ControlSurface>(
        &self,
        event: &JsEvent,
        device: &DeviceMap,
        surface: &mut S,
    ) -> bool {
        if event.init {
            return false;
        }
        match event.kind {
            JsEventKind::Axis => {
                let Some(action) = device.axis(event.number).and_then(|a| self.axes.get(&a)) else {
                    tracing::trace!(number = event.number, "unbound axis");
                    return false;
                };
                let v = event.value as f64;
                match action {
                    AxisAction::Steering => surface.on_steering(v, AXIS_MIN, AXIS_MAX),
                    AxisAction::Forward => surface.on_forward(v, AXIS_MIN, AXIS_MAX),
                    AxisAction::Reverse => surface.on_reverse(v, AXIS_MIN, AXIS_MAX),
                    AxisAction::CameraPan => surface.on_camera_rotate(v, AXIS_MIN, AXIS_MAX),
                    AxisAction::Light => surface.on_light(v, AXIS_MIN, AXIS_MAX),
                }
                true
            }
            JsEventKind::Button => {
                let Some(action) = device
                    .button(event.number)
                    .and_then(|b| self.buttons.get(&b))
                else {
                    tracing::trace!(number = event.number, "unbound button");
                    return false;
                };
                match action {
                    ButtonAction::Brake => surface.on_brake(event.value != 0),
                }
                true
            }
        }
    }
}

fn axis_min() -> f64 {
    AXIS_MIN
}

fn axis_max() -> f64 {
    AXIS_MAX
}

/// Scripted control command.
///
/// Serialized as JSON with tag `"cc"`, e.g. `{"cc":"steer","v":-16000}`.
/// `min`/`max` default to the joystick axis range.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "cc", rename_all = "snake_case")]
pub enum ControlCommand {
    Steer {
        v: f64,
        #[serde(default = "axis_min")]
        min: f64,
        #[serde(default = "axis_max")]
        max: f64,
    },
    Forward {
        v: f64,
        #[serde(default = "axis_min")]
        min: f64,
        #[serde(default = "axis_max")]
        max: f64,
    },
    Reverse {
        v: f64,
        #[serde(default = "axis_min")]
        min: f64,
        #[serde(default = "axis_max")]
        max: f64,
    },
    Camera {
        v: f64,
        #[serde(default = "axis_min")]
        min: f64,
        #[serde(default = "axis_max")]
        max: f64,
    },
    Light {
        v: f64,
        #[serde(default = "axis_min")]
        min: f64,
        #[serde(default = "axis_max")]
        max: f64,
    },
    Brake {
        on: bool,
    },
    Connected,
    Disconnected,
}

impl ControlCommand {
    pub fn apply<S: ControlSurface>(
        self,
        surface: &mut S,
    ) {
        match self {
            ControlCommand::Steer { v, min, max } => surface.on_steering(v, min, max),
            ControlCommand::Forward { v, min, max } => surface.on_forward(v, min, max),
            ControlCommand::Reverse { v, min, max } => surface.on_reverse(v, min, max),
            ControlCommand::Camera { v, min, max } => surface.on_camera_rotate(v, min, max),
            ControlCommand::Light { v, min, max } => surface.on_light(v, min, max),
            ControlCommand::Brake { on } => surface.on_brake(on),
            ControlCommand::Connected => surface.on_connected(),
            ControlCommand::Disconnected => surface.on_disconnected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl ControlSurface for Recorder {
        fn on_steering(&mut self, value: f64, _min: f64, _max: f64) {
            self.calls.push(format!("steer {}", value));
        }
        fn on_forward(&mut self, value: f64, _min: f64, _max: f64) {
            self.calls.push(format!("forward {}", value));
        }
        fn on_reverse(&mut self, value: f64, _min: f64, _max: f64) {
            self.calls.push(format!("reverse {}", value));
        }
        fn on_camera_rotate(&mut self, value: f64, _min: f64, _max: f64) {
            self.calls.push(format!("camera {}", value));
        }
        fn on_light(&mut self, value: f64, _min: f64, _max: f64) {
            self.calls.push(format!("light {}", value));
        }
        fn on_brake(&mut self, pressed: bool) {
            self.calls.push(format!("brake {}", pressed));
        }
        fn on_connected(&mut self) {
            self.calls.push("connected".into());
        }
        fn on_disconnected(&mut self) {
            self.calls.push("disconnected".into());
        }
    }

    fn record(
        time: u32,
        value: i16,
        ty: u8,
        number: u8,
    ) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&time.to_le_bytes());
        buf[4..6].copy_from_slice(&value.to_le_bytes());
        buf[6] = ty;
        buf[7] = number;
        buf
    }

    #[test]
    fn decode_axis_event() {
        let ev = JsEvent::decode(&record(1234, -16000, 0x02, 6)).unwrap();
        assert_eq!(ev.time, 1234);
        assert_eq!(ev.value, -16000);
        assert_eq!(ev.kind, JsEventKind::Axis);
        assert!(!ev.init);
        assert_eq!(ev.number, 6);
    }

    #[test]
    fn decode_init_button_event() {
        let ev = JsEvent::decode(&record(0, 1, 0x81, 1)).unwrap();
        assert_eq!(ev.kind, JsEventKind::Button);
        assert!(ev.init);
    }

    #[test]
    fn decode_rejects_bad_records() {
        assert_eq!(JsEvent::decode(&[0u8; 5]), Err(InputError::ShortRead(5)));
        assert_eq!(
            JsEvent::decode(&record(0, 0, 0x04, 0)),
            Err(InputError::UnknownType(0x04))
        );
    }

    #[test]
    fn default_bindings_route_pad_layout() {
        let bindings = InputBindings::default();
        let device = DeviceMap::default();
        let mut rec = Recorder::default();

        // xpadneo: axis 0 = X, 6 = GAS, 7 = BRAKE, 2 = Z, 9 = HAT0Y; button 1 = B
        let events = [
            (100, 0x02, 0),
            (200, 0x02, 6),
            (300, 0x02, 7),
            (400, 0x02, 2),
            (-32767, 0x02, 9),
            (1, 0x01, 1),
            (0, 0x01, 1),
        ];
        for (value, ty, number) in events {
            let ev = JsEvent::decode(&record(0, value, ty, number)).unwrap();
            assert!(bindings.dispatch(&ev, &device, &mut rec));
        }
        assert_eq!(
            rec.calls,
            vec![
                "steer 100",
                "forward 200",
                "reverse 300",
                "camera 400",
                "light -32767",
                "brake true",
                "brake false"
            ]
        );
    }

    #[test]
    fn unbound_and_init_events_are_ignored() {
        let bindings = InputBindings::default();
        let device = DeviceMap::default();
        let mut rec = Recorder::default();

        let hat = JsEvent::decode(&record(0, 1, 0x02, 8)).unwrap();
        let init = JsEvent::decode(&record(0, 1, 0x82, 0)).unwrap();
        let unknown = JsEvent::decode(&record(0, 1, 0x02, 42)).unwrap();
        assert!(!bindings.dispatch(&hat, &device, &mut rec));
        assert!(!bindings.dispatch(&init, &device, &mut rec));
        assert!(!bindings.dispatch(&unknown, &device, &mut rec));
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn code_lookup() {
        assert_eq!(Axis::from_code(0x09), Some(Axis::Gas));
        assert_eq!(Axis::from_code(0x20), None);
        assert_eq!(Button::from_code(0x131), Some(Button::B));
        assert_eq!(Button::from_code(0x120), None);
    }

    #[test]
    fn scripted_commands_parse_with_default_range() {
        let cmd: ControlCommand = serde_json::from_str(r#"{"cc":"steer","v":-16000}"#).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Steer {
                v: -16000.0,
                min: AXIS_MIN,
                max: AXIS_MAX
            }
        );
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"cc":"forward","v":50,"min":0,"max":100}"#).unwrap();
        let mut rec = Recorder::default();
        cmd.apply(&mut rec);
        serde_json::from_str::<ControlCommand>(r#"{"cc":"brake","on":true}"#)
            .unwrap()
            .apply(&mut rec);
        assert_eq!(rec.calls, vec!["forward 50", "brake true"]);
    }
}
