//! Detector class names to shopping search terms.

/// Map a COCO class label to a better shopping query. Unknown labels pass
/// through trimmed.
pub fn shopping_term(label: &str) -> String {
    let label = label.trim();
    let mapped = match label {
        "person" => "fashion clothing",
        "bicycle" => "bicycle",
        "car" => "car accessories",
        "motorcycle" => "motorcycle accessories",
        "airplane" => "airplane model",
        "bus" => "bus model toy",
        "train" => "train model",
        "truck" => "truck accessories",
        "boat" => "boat accessories",
        "traffic light" => "traffic light decor",
        "fire hydrant" => "fire hydrant decor",
        "stop sign" => "stop sign decor",
        "parking meter" => "parking meter",
        "bench" => "outdoor bench",
        "bird" => "bird feeder",
        "cat" => "cat supplies",
        "dog" => "dog supplies",
        "horse" => "horse supplies",
        "sheep" => "sheep plush",
        "cow" => "cow plush",
        "elephant" => "elephant plush toy",
        "bear" => "bear plush toy",
        "zebra" => "zebra plush toy",
        "giraffe" => "giraffe plush toy",
        "backpack" => "backpack",
        "umbrella" => "umbrella",
        "handbag" => "handbag",
        "tie" => "necktie",
        "suitcase" => "suitcase luggage",
        "frisbee" => "frisbee",
        "skis" => "skis",
        "snowboard" => "snowboard",
        "sports ball" => "sports ball",
        "kite" => "kite",
        "baseball bat" => "baseball bat",
        "baseball glove" => "baseball glove",
        "skateboard" => "skateboard",
        "surfboard" => "surfboard",
        "tennis racket" => "tennis racket",
        "bottle" => "water bottle",
        "wine glass" => "wine glass set",
        "cup" => "coffee mug",
        "fork" => "fork set silverware",
        "knife" => "kitchen knife set",
        "spoon" => "spoon set",
        "bowl" => "bowl set",
        "banana" => "banana snack",
        "apple" => "apple fruit",
        "sandwich" => "sandwich maker",
        "orange" => "orange fruit",
        "broccoli" => "broccoli seeds",
        "carrot" => "carrot seeds",
        "hot dog" => "hot dog maker",
        "pizza" => "pizza oven",
        "donut" => "donut maker",
        "cake" => "cake baking supplies",
        "chair" => "office chair",
        "couch" => "sofa couch",
        "potted plant" => "indoor plant pot",
        "bed" => "bed frame mattress",
        "dining table" => "dining table",
        "toilet" => "toilet seat",
        "tv" => "smart TV",
        "laptop" => "laptop computer",
        "mouse" => "wireless mouse",
        "remote" => "universal remote",
        "keyboard" => "mechanical keyboard",
        "cell phone" => "smartphone",
        "microwave" => "microwave oven",
        "oven" => "oven",
        "toaster" => "toaster",
        "sink" => "kitchen sink",
        "refrigerator" => "refrigerator",
        "book" => "bestselling books",
        "clock" => "wall clock",
        "vase" => "flower vase",
        "scissors" => "scissors",
        "teddy bear" => "teddy bear plush",
        "hair drier" => "hair dryer",
        "toothbrush" => "electric toothbrush",
        other => other,
    };
    mapped.to_owned()
}
