use iced::{Alignment, Element, Length};
use iced::theme;
use iced::widget::{
    Column, button, column, container, horizontal_rule, row, scrollable, text, text_input,
};

use crate::device::types::PeripheralRef;
use crate::gui::application::SwellApplication;
use crate::gui::navigation::Route;
use crate::gui::style::DeviceRowStyleSheet;
use crate::gui::types::{Message, TimerChange};

fn page<'a>(content: impl Into<Element<'a, Message>>) -> Element<'a, Message> {
    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .padding(20)
        .into()
}

impl SwellApplication {
    fn header(&self) -> Element<Message> {
        let mut back = button(text("Back")).style(theme::Button::Secondary);
        if self.routes.can_go_back() {
            back = back.on_press(Message::Back);
        }

        column![
            row![
                back,
                text(self.routes.current()).size(24),
            ].align_items(Alignment::Center).spacing(20),
            horizontal_rule(10),
        ].spacing(10).into()
    }

    pub(super) fn view_notice(&self, notice: &str) -> Element<Message> {
        page(
            column![
                text(notice),

                button(text("Okay"))
                    .on_press(Message::NoticeConfirmed),

            ].align_items(Alignment::Center).spacing(20)
        )
    }

    pub(super) fn view_home(&self) -> Element<Message> {
        let device_card = match &self.active {
            Some(peripheral) => column![
                text(format!("{} is connected", peripheral.display_name())),
                button(text("Open")).on_press(Message::Navigate(Route::Device)),
            ],
            None => column![
                text("No lamp connected"),
                text(format!("Last used: {}", self.config.preferred_device)).size(14),
                button(text("Open")).on_press(Message::Navigate(Route::Device)),
            ],
        };

        page(
            column![
                text("Swell").size(40),
                horizontal_rule(10),
                device_card.spacing(10).align_items(Alignment::Center),
                button(text("Add device"))
                    .style(theme::Button::Positive)
                    .on_press(Message::Navigate(Route::BluetoothScan)),
                button(text("Timer"))
                    .style(theme::Button::Secondary)
                    .on_press(Message::Navigate(Route::Timer)),
            ]
                .spacing(30)
                .width(Length::Fill)
                .align_items(Alignment::Center)
        )
    }

    pub(super) fn view_device(&self) -> Element<Message> {
        let name = self.active.as_ref().map(PeripheralRef::display_name).unwrap_or("Lamp");

        let status = match self.led_status.as_ref().and_then(|status| status.is_on()) {
            Some(true) => "The lamp is on",
            Some(false) => "The lamp is off",
            None => "Status unknown",
        };

        let mut on_button = button(text("Turn on")).style(theme::Button::Primary);
        let mut off_button = button(text("Turn off")).style(theme::Button::Secondary);
        if !self.led_busy {
            on_button = on_button.on_press(Message::SetLed(true));
            off_button = off_button.on_press(Message::SetLed(false));
        }

        page(
            column![
                self.header(),
                text(name).size(20),
                text(if self.led_busy { "Sending…" } else { status }),
                row![on_button, off_button].spacing(20),
                row![
                    button(text("Refresh")).style(theme::Button::Secondary).on_press(Message::RefreshStatus),
                    button(text("Timer")).style(theme::Button::Secondary).on_press(Message::Navigate(Route::Timer)),
                    button(text("Details")).style(theme::Button::Secondary).on_press(Message::Navigate(Route::Details)),
                ].spacing(10),
                button(text("Disconnect"))
                    .style(theme::Button::Destructive)
                    .on_press(Message::DisconnectPress),
            ]
                .spacing(30)
                .align_items(Alignment::Center)
        )
    }

    pub(super) fn view_not_active(&self) -> Element<Message> {
        page(
            column![
                self.header(),
                text("Your lamp is not connected").size(20),
                text("Make sure Bluetooth is enabled and the lamp is powered on."),
                button(text("Find lamp"))
                    .style(theme::Button::Positive)
                    .on_press(Message::Navigate(Route::BluetoothScan)),
                button(text("Open Bluetooth settings"))
                    .style(theme::Button::Secondary)
                    .on_press(Message::OpenSettings),
            ]
                .spacing(30)
                .align_items(Alignment::Center)
        )
    }

    fn device_row(&self, peripheral: &PeripheralRef) -> Element<Message> {
        let rssi = match peripheral.rssi {
            Some(rssi) => format!("{} dBm", rssi),
            None => String::new(),
        };

        let label = if self.connecting.as_ref() == Some(&peripheral.id) {
            "Connecting…".to_string()
        } else {
            rssi
        };

        let mut row_button = button(
            row![
                column![
                    text(peripheral.display_name()),
                    text(&peripheral.id).size(12),
                ].width(Length::Fill),
                text(label),
            ].align_items(Alignment::Center)
        )
            .width(Length::Fill)
            .padding(12)
            .style(theme::Button::Custom(Box::new(DeviceRowStyleSheet)));

        if self.connecting.is_none() {
            row_button = row_button.on_press(Message::ConnectPress(peripheral.clone()));
        }

        row_button.into()
    }

    pub(super) fn view_scan(&self) -> Element<Message> {
        let mut scan_button = if self.scanning {
            button(text("Stop scanning")).style(theme::Button::Secondary)
        } else {
            button(text("Scan")).style(theme::Button::Primary)
        };
        if self.connecting.is_none() && self.manager.is_some() {
            scan_button = scan_button.on_press(if self.scanning { Message::StopScan } else { Message::StartScan });
        }

        let mut content = column![
            self.header(),
            text("Find and connect to your ESP32 device"),
            scan_button,
        ]
            .spacing(20)
            .align_items(Alignment::Center);

        if let Some(peripheral) = &self.confirm {
            content = content.push(
                column![
                    text(format!(
                        "{} does not appear to be an ESP32 device. Do you still want to connect?",
                        peripheral.display_name(),
                    )),
                    row![
                        button(text("Connect")).on_press(Message::ConnectConfirmed(peripheral.clone())),
                        button(text("Cancel")).style(theme::Button::Secondary).on_press(Message::ConnectCancelled),
                    ].spacing(20),
                ].spacing(10).align_items(Alignment::Center)
            );
        }

        if self.devices.is_empty() {
            let empty = if self.manager.is_none() {
                "Waiting for Bluetooth…"
            } else if self.scanning {
                "Scanning…"
            } else {
                "No devices found"
            };
            content = content.push(text(empty));
        } else {
            content = content.push(scrollable(
                Column::with_children(
                    self.devices
                        .iter()
                        .map(|peripheral| self.device_row(peripheral))
                )
                    .spacing(10)
            ));
        }

        page(content)
    }

    pub(super) fn view_timer(&self) -> Element<Message> {
        let form = &self.timer_form;

        page(
            column![
                self.header(),
                row![
                    text("From").width(120),
                    text_input("HH:MM", &form.from)
                        .width(80)
                        .on_input(|value| Message::TimerChange(TimerChange::From(value))),
                ].align_items(Alignment::Center).spacing(10),
                row![
                    text("To").width(120),
                    text_input("HH:MM", &form.to)
                        .width(80)
                        .on_input(|value| Message::TimerChange(TimerChange::To(value))),
                ].align_items(Alignment::Center).spacing(10),
                row![
                    text("UTC offset (min)").width(120),
                    text_input("0", &form.utc_offset)
                        .width(80)
                        .on_input(|value| Message::TimerChange(TimerChange::UtcOffset(value))),
                ].align_items(Alignment::Center).spacing(10),
                button(text(if form.enabled { "Timer: ON" } else { "Timer: OFF" }))
                    .style(if form.enabled { theme::Button::Primary } else { theme::Button::Secondary })
                    .on_press(Message::TimerChange(TimerChange::ToggleEnabled)),
                button(text("Save setting"))
                    .style(theme::Button::Positive)
                    .on_press(Message::SaveTimer),
            ]
                .spacing(20)
                .align_items(Alignment::Center)
        )
    }

    pub(super) fn view_details(&self) -> Element<Message> {
        let mut content = column![self.header()].spacing(10);

        if let Some(peripheral) = &self.active {
            let rssi = peripheral.rssi.map(|rssi| format!("{} dBm", rssi)).unwrap_or("-".to_string());
            content = content
                .push(text(format!("Name: {}", peripheral.display_name())))
                .push(text(format!("Identifier: {}", peripheral.id)))
                .push(text(format!("Signal: {}", rssi)));
        }

        let status = match &self.led_status {
            Some(status) => serde_json::to_string_pretty(&status.0).unwrap_or_default(),
            None => "-".to_string(),
        };

        content = content
            .push(text("Last status reported by the lamp:"))
            .push(text(status).size(14))
            .push(button(text("Refresh")).style(theme::Button::Secondary).on_press(Message::RefreshStatus));

        page(content)
    }
}
