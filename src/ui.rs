//! Rendering of the live fit chart
//!
//! The chart is cleared and redrawn from scratch every frame: the target curve, the
//! prediction from the most recent step, and a status line.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
};

use crate::{
    datasets::{SineDataset, y_range},
    trainer::StepOutput,
};

/// Chart data point
pub type DataPoint = (f64, f64);

/// Everything needed to draw one frame
#[derive(Debug, Clone)]
pub struct FitView {
    pub target: Vec<DataPoint>,
    pub prediction: Vec<DataPoint>,
    pub step: usize,
    pub loss: Option<f32>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl FitView {
    pub fn new(dataset: &SineDataset) -> Self {
        let target = to_points(dataset.x(), dataset.y());
        let (lo, hi) = y_range([dataset.y()]);
        let x_bounds = [
            dataset.x().first().copied().unwrap_or_default() as f64,
            dataset.x().last().copied().unwrap_or_default() as f64,
        ];
        Self {
            target,
            prediction: vec![],
            step: 0,
            loss: None,
            x_bounds,
            y_bounds: [lo as f64, hi as f64],
        }
    }

    /// Replaces the prediction curve and refits the vertical axis
    pub fn update(&mut self, dataset: &SineDataset, out: &StepOutput) {
        self.prediction = to_points(dataset.x(), &out.prediction)
            .into_iter()
            .filter(|(_, y)| y.is_finite())
            .collect();
        self.step = out.step;
        self.loss = Some(out.loss);
        let (lo, hi) = y_range([dataset.y(), out.prediction.as_slice()]);
        self.y_bounds = [lo as f64, hi as f64];
    }
}

fn to_points(x: &[f32], y: &[f32]) -> Vec<DataPoint> {
    x.iter()
        .zip(y.iter())
        .map(|(x, y)| (*x as f64, *y as f64))
        .collect()
}

/// Render the complete UI
pub fn render(view: &FitView, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),   // Chart
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    render_chart(view, frame, chunks[0]);
    render_status(view, frame, chunks[1]);
}

fn axis_labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::raw(format!("{:.1}", v)))
        .collect()
}

fn render_chart(view: &FitView, frame: &mut Frame, area: Rect) {
    let datasets = vec![
        Dataset::default()
            .name("sin(x)")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Blue))
            .data(&view.target),
        Dataset::default()
            .name("network")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&view.prediction),
    ];

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(
                    " Sine fit ",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
        )
        .x_axis(
            Axis::default()
                .title("x")
                .bounds(view.x_bounds)
                .labels(axis_labels(view.x_bounds)),
        )
        .y_axis(
            Axis::default()
                .title("y")
                .bounds(view.y_bounds)
                .labels(axis_labels(view.y_bounds)),
        );

    frame.render_widget(chart, area);
}

fn render_status(view: &FitView, frame: &mut Frame, area: Rect) {
    let loss = match view.loss {
        Some(loss) => format!("{:.6}", loss),
        None => "-".to_string(),
    };
    let status = Line::from(vec![
        Span::styled(
            format!(" step {} ", view.step),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("| loss {} ", loss)),
        Span::styled("| q to quit", Style::default().fg(Color::DarkGray)),
    ]);
    let paragraph = Paragraph::new(status).block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;

    fn rendered_text(view: &FitView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(view, frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_new_view() {
        let dataset = SineDataset::new();
        let view = FitView::new(&dataset);
        assert_eq!(view.target.len(), dataset.len());
        assert!(view.prediction.is_empty());
        assert_eq!(view.x_bounds[0], -10.0);
        assert!(view.y_bounds[0] < -0.99 && view.y_bounds[1] > 0.99);
    }

    #[test]
    fn test_update_replaces_prediction() {
        let dataset = SineDataset::new();
        let mut view = FitView::new(&dataset);
        let out = StepOutput {
            step: 3,
            loss: 0.25,
            prediction: vec![4.0; dataset.len()],
        };
        view.update(&dataset, &out);
        assert_eq!(view.prediction.len(), dataset.len());
        assert_eq!(view.step, 3);
        assert_eq!(view.loss, Some(0.25));
        // the vertical axis grows to fit the prediction
        assert!(view.y_bounds[1] > 4.0);

        let out = StepOutput {
            step: 4,
            loss: 0.2,
            prediction: vec![0.0; dataset.len()],
        };
        view.update(&dataset, &out);
        assert!(view.y_bounds[1] < 4.0);
    }

    #[test]
    fn test_render_status() {
        let dataset = SineDataset::new();
        let mut view = FitView::new(&dataset);
        let text = rendered_text(&view);
        assert!(text.contains("Sine fit"));
        assert!(text.contains("step 0"));

        view.update(
            &dataset,
            &StepOutput {
                step: 12,
                loss: 0.5,
                prediction: dataset.y().to_vec(),
            },
        );
        let text = rendered_text(&view);
        assert!(text.contains("step 12"));
        assert!(text.contains("loss 0.500000"));
    }
}
