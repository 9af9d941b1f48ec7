use std::sync::Arc;
use iced::{window, Event};

use crate::config::types::Config;
use crate::device::manager::ConnectionManager;
use crate::device::types::{DeviceEvent, LedStatus, PeripheralRef};
use crate::gui::navigation::Route;

#[derive(Debug, Clone)]
pub enum TimerChange {
    From(String),
    To(String),
    UtcOffset(String),
    ToggleEnabled,
}

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    CloseReady(window::Id),
    Tick,
    NoticeConfirmed,

    TransportReady(Result<Arc<ConnectionManager>, String>),
    DeviceEvent(DeviceEvent),

    ConfigLoadComplete((Config, Option<String>)),
    ConfigSaveComplete(Option<String>), // error message if saving failed

    Navigate(Route),
    Back,

    StartScan,
    StopScan,
    ScanComplete(Vec<PeripheralRef>),
    ConnectPress(PeripheralRef),
    ConnectConfirmed(PeripheralRef),
    ConnectCancelled,
    ConnectComplete(PeripheralRef, bool),
    DisconnectPress,
    DisconnectComplete(bool),

    RefreshStatus,
    StatusRead(Option<LedStatus>),
    SetLed(bool),
    SetLedComplete(bool),

    OpenSettings,
    SettingsOpened(bool),

    TimerChange(TimerChange),
    SaveTimer,
}
