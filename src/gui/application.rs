use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use futures::SinkExt;
use futures::channel::mpsc::Sender;
use iced::{Application, Command, Element, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::subscription;
use iced::theme::Theme;
use iced::time::every as iced_time_every;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtleTransport;
use crate::device::constants::{looks_like_lamp, SCREEN_SCAN_TIMEOUT};
use crate::device::manager::ConnectionManager;
use crate::device::permissions::open_bluetooth_settings;
use crate::device::types::{DeviceEvent, LedCommand, LedStatus, PeripheralId, PeripheralRef};
use crate::error::AppRunError;
use crate::gui::navigation::{Route, RouteStack};
use crate::gui::types::{Message, TimerChange};
use crate::timer::{TimeOfDay, TimerConfig};

pub struct ApplicationFlags {
    config_io: ConfigIO,
}

/// Text entered on the timer screen; only parsed when saved.
#[derive(Debug, Clone, Default)]
pub struct TimerForm {
    pub from: String,
    pub to: String,
    pub utc_offset: String,
    pub enabled: bool,
}

impl TimerForm {
    fn from_config(timer: &TimerConfig) -> Self {
        TimerForm {
            from: timer.from.to_string(),
            to: timer.to.to_string(),
            utc_offset: timer.utc_offset_minutes.to_string(),
            enabled: timer.enabled,
        }
    }

    fn parse(&self) -> Result<TimerConfig, String> {
        let from: TimeOfDay = self.from.parse().map_err(|err| format!("From: {}", err))?;
        let to: TimeOfDay = self.to.parse().map_err(|err| format!("To: {}", err))?;
        let utc_offset_minutes = self.utc_offset.trim().parse::<i16>()
            .ok()
            .filter(|offset| offset.abs() <= 14 * 60)
            .ok_or_else(|| format!("UTC offset: \"{}\" is not a number of minutes", self.utc_offset))?;

        Ok(TimerConfig { enabled: self.enabled, from, to, utc_offset_minutes })
    }
}

pub struct SwellApplication {
    // messages that the user must click away
    pub(super) notices: Vec<String>,

    config_io: ConfigIO,
    pub(super) config: Config,

    // None until the bluetooth adapter has been opened
    pub(super) manager: Option<Arc<ConnectionManager>>,

    pub(super) routes: RouteStack,
    pub(super) scanning: bool,
    pub(super) devices: Vec<PeripheralRef>,
    pub(super) connecting: Option<PeripheralId>,
    // a peripheral that does not look like a lamp, waiting for the user to confirm
    pub(super) confirm: Option<PeripheralRef>,
    pub(super) active: Option<PeripheralRef>,
    pub(super) led_status: Option<LedStatus>,
    pub(super) led_busy: bool,
    pub(super) timer_form: TimerForm,

    // the last command sent because of the timer, so it is only sent once per transition
    last_timer_command: Option<LedCommand>,
}

impl SwellApplication {
    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    if err.is_file_not_found_error() {
                        info!("Config file not found, using defaults");
                        (Config::default(), None)
                    } else {
                        error!("Failed to load config: {:?}", &err);
                        (Config::default(), Some(format!("Failed to load config: {}", &err)))
                    }
                },
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn save_config(&self) -> Command<Message> {
        let config = self.config.clone();
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.save(&config).await {
                Ok(_) => None,
                Err(err) => {
                    error!("Failed to save config: {:?}", &err);
                    Some(format!("Failed to save config: {}", &err))
                },
            }
        };

        Command::perform(fut, Message::ConfigSaveComplete)
    }

    fn open_transport(&self) -> Command<Message> {
        let fut = async move {
            match BtleTransport::new().await {
                Ok(transport) => {
                    let transport = Arc::new(transport);
                    Ok(Arc::new(ConnectionManager::new(transport.clone(), transport)))
                },
                Err(err) => {
                    error!("Failed to open bluetooth adapter: {:?}", &err);
                    Err(err.to_string())
                },
            }
        };

        Command::perform(fut, Message::TransportReady)
    }

    fn start_scan(&mut self) -> Command<Message> {
        let Some(manager) = self.manager.clone() else {
            return Command::none();
        };

        if self.scanning {
            return Command::none();
        }

        self.scanning = true;
        self.devices.clear();
        self.confirm = None;

        let fut = async move {
            manager.scan(Duration::from_millis(SCREEN_SCAN_TIMEOUT)).await
        };

        Command::perform(fut, Message::ScanComplete)
    }

    fn connect(&mut self, peripheral: PeripheralRef) -> Command<Message> {
        let Some(manager) = self.manager.clone() else {
            return Command::none();
        };

        // connecting while the radio is scanning is unreliable on some adapters
        manager.cancel_scan();
        self.connecting = Some(peripheral.id.clone());

        let id = peripheral.id.clone();
        let fut = async move {
            manager.connect(&id).await
        };

        Command::perform(fut, move |success| Message::ConnectComplete(peripheral, success))
    }

    fn refresh_status(&self) -> Command<Message> {
        let Some(manager) = self.manager.clone() else {
            return Command::none();
        };

        if self.active.is_none() {
            return Command::none();
        }

        let fut = async move {
            manager.read_status().await
        };

        Command::perform(fut, Message::StatusRead)
    }

    fn send_led_command(&mut self, command: LedCommand) -> Command<Message> {
        let Some(manager) = self.manager.clone() else {
            return Command::none();
        };

        self.led_busy = true;

        let fut = async move {
            manager.send_command(command).await
        };

        Command::perform(fut, Message::SetLedComplete)
    }

    fn apply_timer(&mut self) -> Command<Message> {
        let timer = self.config.timer;
        let desired = timer.desired_state(TimeOfDay::now(timer.utc_offset_minutes));

        if desired.is_none() || self.active.is_none() {
            self.last_timer_command = None;
            return Command::none();
        }

        if desired == self.last_timer_command || self.led_busy {
            return Command::none();
        }

        self.last_timer_command = desired;
        match desired {
            Some(command) => {
                info!("Timer turns the lamp {}", command.command);
                self.send_led_command(command)
            },
            None => Command::none(),
        }
    }

    // screens that only make sense with a connected lamp
    fn redirect(&self, route: Route) -> Route {
        match route {
            Route::Device | Route::Details if self.active.is_none() => Route::NotActiveBluetooth,
            _ => route,
        }
    }

    fn go_to(&mut self, route: Route) -> Command<Message> {
        let route = self.redirect(route);
        let previous = self.routes.navigate(route);
        self.route_changed(previous)
    }

    fn route_changed(&mut self, previous: Route) -> Command<Message> {
        let current = self.routes.current();
        if previous == current {
            return Command::none();
        }

        if previous == Route::BluetoothScan {
            // leaving the scan screen stops the scan
            if let Some(manager) = &self.manager {
                manager.cancel_scan();
            }
            self.confirm = None;
        }

        match current {
            Route::BluetoothScan => self.start_scan(),
            Route::Device | Route::Details => self.refresh_status(),
            Route::Timer => {
                self.timer_form = TimerForm::from_config(&self.config.timer);
                Command::none()
            },
            Route::Home | Route::NotActiveBluetooth => Command::none(),
        }
    }

    fn lost_connection(&mut self) {
        self.active = None;
        self.led_status = None;
        self.led_busy = false;
        self.last_timer_command = None;

        if matches!(self.routes.current(), Route::Device | Route::Details) {
            self.routes.replace(Route::NotActiveBluetooth);
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) -> Command<Message> {
        match event {
            DeviceEvent::ScanStarted => {
                self.devices.clear();
            },
            DeviceEvent::Discovered(peripheral) => {
                if !self.devices.iter().any(|p| p.id == peripheral.id) {
                    self.devices.push(peripheral);
                }
            },
            DeviceEvent::ScanFinished(_) => {},
            DeviceEvent::ScanError(message) => {
                self.notices.push(format!("Scan error: {}", message));
            },
            DeviceEvent::PermissionDenied => {
                self.notices.push(
                    "To scan for Bluetooth devices, Swell needs access to Bluetooth. \
You can grant it in the Bluetooth or privacy settings of your system.".to_string()
                );
                self.routes.replace(Route::NotActiveBluetooth);
            },
            DeviceEvent::Connected(_) => {},
            DeviceEvent::Disconnected(id) => {
                if self.active.as_ref().is_some_and(|p| p.id == id) {
                    info!("Lamp {} disconnected", id);
                    self.lost_connection();
                }
            },
        }

        Command::none()
    }
}

async fn forward_device_events(manager: Arc<ConnectionManager>, mut output: Sender<DeviceEvent>) -> Infallible {
    let mut events = manager.subscribe();

    loop {
        match events.recv().await {
            Ok(event) => {
                output.send(event).await.expect("Failed to send DeviceEvent");
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!("GUI fell behind, {} device events skipped", skipped);
            },
            Err(RecvError::Closed) => {
                // the manager lives as long as the application
                futures::future::pending::<()>().await;
            },
        }
    }
}

pub fn device_event_subscription(manager: Arc<ConnectionManager>) -> Subscription<DeviceEvent> {
    struct DeviceEvents;

    subscription::channel(
        std::any::TypeId::of::<DeviceEvents>(),
        64,
        move |subscription_sender| {
            forward_device_events(manager, subscription_sender)
        },
    )
}

impl Application for SwellApplication {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (SwellApplication, Command<Self::Message>) {
        let config = Config::default();

        let app = SwellApplication {
            notices: Vec::new(),
            config_io: flags.config_io,
            timer_form: TimerForm::from_config(&config.timer),
            config,
            manager: None,
            routes: RouteStack::new(),
            scanning: false,
            devices: Vec::new(),
            connecting: None,
            confirm: None,
            active: None,
            led_status: None,
            led_busy: false,
            last_timer_command: None,
        };

        let command = Command::batch(vec![
            app.load_config(),
            app.open_transport(),
        ]);
        (app, command)
    }

    fn title(&self) -> String {
        format!(concat!("Swell ", env!("CARGO_PKG_VERSION"), " - {}"), self.routes.current())
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");

                if let Some(manager) = self.manager.clone() {
                    manager.cancel_scan();
                    let fut = async move {
                        manager.disconnect().await
                    };
                    return Command::perform(fut, move |_| Message::CloseReady(id));
                }

                return window::close(id);
            },
            Message::EventOccurred(_) => {},
            Message::CloseReady(id) => {
                return window::close(id);
            },
            Message::Tick => {
                if let Some(manager) = &self.manager {
                    // applies pending link loss events, which are then delivered as DeviceEvent
                    manager.is_connected();
                }
                return self.apply_timer();
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },

            Message::TransportReady(Ok(manager)) => {
                info!("Bluetooth adapter ready");
                self.manager = Some(manager);

                if self.routes.current() == Route::BluetoothScan {
                    return self.start_scan();
                }
            },
            Message::TransportReady(Err(message)) => {
                self.notices.push(format!("Bluetooth is not available: {}", message));
                self.routes.replace(Route::NotActiveBluetooth);
            },
            Message::DeviceEvent(event) => {
                return self.handle_device_event(event);
            },

            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                self.timer_form = TimerForm::from_config(&config.timer);
                self.config = config;
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
            },
            Message::ConfigSaveComplete(error_message) => {
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
            },

            Message::Navigate(route) => {
                return self.go_to(route);
            },
            Message::Back => {
                let previous = self.routes.back();
                return self.route_changed(previous);
            },

            Message::StartScan => {
                return self.start_scan();
            },
            Message::StopScan => {
                if let Some(manager) = &self.manager {
                    manager.cancel_scan();
                }
            },
            Message::ScanComplete(devices) => {
                self.scanning = false;
                self.devices = devices;
            },
            Message::ConnectPress(peripheral) => {
                if self.connecting.is_some() {
                    return Command::none();
                }

                if looks_like_lamp(peripheral.display_name()) {
                    return self.connect(peripheral);
                }
                self.confirm = Some(peripheral);
            },
            Message::ConnectConfirmed(peripheral) => {
                self.confirm = None;
                return self.connect(peripheral);
            },
            Message::ConnectCancelled => {
                self.confirm = None;
            },
            Message::ConnectComplete(peripheral, success) => {
                self.connecting = None;

                if !success {
                    self.notices.push(format!("Could not connect to {}", peripheral.display_name()));
                    return Command::none();
                }

                self.notices.push(format!("Successfully connected to {}", peripheral.display_name()));
                self.led_status = None;
                self.last_timer_command = None;
                let name_changed = peripheral.name.as_deref() != Some(self.config.preferred_device.as_str());
                if let Some(name) = &peripheral.name {
                    self.config.preferred_device = name.clone();
                }
                self.active = Some(peripheral);

                let mut commands = vec![self.go_to(Route::Device)];
                if name_changed {
                    commands.push(self.save_config());
                }
                return Command::batch(commands);
            },
            Message::DisconnectPress => {
                if let Some(manager) = self.manager.clone() {
                    let fut = async move {
                        manager.disconnect().await
                    };
                    return Command::perform(fut, Message::DisconnectComplete);
                }
            },
            Message::DisconnectComplete(_) => {
                self.lost_connection();
                return self.go_to(Route::Home);
            },

            Message::RefreshStatus => {
                return self.refresh_status();
            },
            Message::StatusRead(status) => {
                if status.is_none() && self.active.is_some() {
                    warn!("Could not read the LED status");
                }
                self.led_status = status;
            },
            Message::SetLed(on) => {
                if self.led_busy {
                    return Command::none();
                }
                return self.send_led_command(LedCommand::from_bool(on));
            },
            Message::SetLedComplete(success) => {
                self.led_busy = false;
                if !success {
                    self.notices.push("The lamp did not accept the command".to_string());
                }
                return self.refresh_status();
            },

            Message::OpenSettings => {
                let fut = async move {
                    match open_bluetooth_settings().await {
                        Ok(_) => true,
                        Err(err) => {
                            error!("Failed to open bluetooth settings: {:?}", &err);
                            false
                        },
                    }
                };
                return Command::perform(fut, Message::SettingsOpened);
            },
            Message::SettingsOpened(opened) => {
                if !opened {
                    self.notices.push("Open the Bluetooth settings of your system to allow Swell to use Bluetooth".to_string());
                }
            },

            Message::TimerChange(change) => {
                match change {
                    TimerChange::From(value) => self.timer_form.from = value,
                    TimerChange::To(value) => self.timer_form.to = value,
                    TimerChange::UtcOffset(value) => self.timer_form.utc_offset = value,
                    TimerChange::ToggleEnabled => self.timer_form.enabled = !self.timer_form.enabled,
                }
            },
            Message::SaveTimer => {
                match self.timer_form.parse() {
                    Ok(timer) => {
                        self.config.timer = timer;
                        self.last_timer_command = None;
                        return self.save_config();
                    },
                    Err(message) => {
                        self.notices.push(message);
                    },
                }
            },
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            event::listen().map(Message::EventOccurred),
            iced_time_every(Duration::from_secs(1)).map(|_| Message::Tick),
        ];

        if let Some(manager) = &self.manager {
            subscriptions.push(device_event_subscription(manager.clone()).map(Message::DeviceEvent));
        }

        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return self.view_notice(notice);
        }

        match self.routes.current() {
            Route::Home => self.view_home(),
            Route::Device => self.view_device(),
            Route::NotActiveBluetooth => self.view_not_active(),
            Route::BluetoothScan => self.view_scan(),
            Route::Timer => self.view_timer(),
            Route::Details => self.view_details(),
        }
    }
}

pub fn run_application() -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested), so the lamp is disconnected cleanly
    settings.id = Some("swell".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(420.0, 720.0);

    // this function will call process::exit() unless there was a startup error
    SwellApplication::run(settings)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_form_parses() {
        let form = TimerForm {
            from: "22:00".to_string(),
            to: "6:30".to_string(),
            utc_offset: " 120 ".to_string(),
            enabled: true,
        };

        let timer = form.parse().unwrap();
        assert_eq!(timer.from.to_string(), "22:00");
        assert_eq!(timer.to.to_string(), "06:30");
        assert_eq!(timer.utc_offset_minutes, 120);
        assert!(timer.enabled);
    }

    #[test]
    fn timer_form_rejects_garbage() {
        let valid = TimerForm::from_config(&TimerConfig::default());
        assert_eq!(valid.parse().unwrap(), TimerConfig::default());

        let bad_time = TimerForm { to: "later".to_string(), ..valid.clone() };
        assert!(bad_time.parse().unwrap_err().starts_with("To:"));

        let bad_offset = TimerForm { utc_offset: "9000".to_string(), ..valid };
        assert!(bad_offset.parse().unwrap_err().starts_with("UTC offset:"));
    }
}
