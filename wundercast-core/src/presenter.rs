//! The boundary between the pipeline and whatever renders it.

use crate::{error::ErrorClass, model::WeatherResult};

/// Label shown as soon as a location search starts.
pub const CURRENT_LOCATION_LABEL: &str = "Current Location";

/// Presentation layer driven by the pipeline.
///
/// Every call is made from the pipeline's main task, in the order the
/// pipeline produced the effects.
pub trait Presenter: Send {
    fn show_result(&mut self, result: &WeatherResult);

    fn set_spinner(&mut self, visible: bool);

    fn set_labels_hidden(&mut self, hidden: bool);

    fn show_placeholder(&mut self, label: &str);

    fn show_message(&mut self, message: &str);
}

/// Forward a classified failure to the user. Has no effect on retries.
pub fn notify(presenter: &mut dyn Presenter, class: ErrorClass) {
    presenter.show_message(class.message());
}
